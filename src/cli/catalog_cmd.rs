//! `languages` and `tags` subcommands: what the synthesizer accepts.

use std::path::Path;

use super::{connect, report_error, EXIT_OK};
use crate::ipc::LanguageInfo;

/// Run `languages [--json]`.
pub async fn run_languages(socket_path: &Path, json: bool) -> i32 {
    let mut client = match connect(socket_path).await {
        Ok(client) => client,
        Err(code) => return code,
    };

    match client.supported_languages().await {
        Ok(languages) => {
            if json {
                print_json(&languages);
            } else {
                for line in format_languages(&languages) {
                    println!("{}", line);
                }
                println!("Only multilingual models honour codes other than en.");
            }
            EXIT_OK
        }
        Err(e) => report_error(&e),
    }
}

/// Run `tags [--json]`.
pub async fn run_tags(socket_path: &Path, json: bool) -> i32 {
    let mut client = match connect(socket_path).await {
        Ok(client) => client,
        Err(code) => return code,
    };

    match client.supported_tags().await {
        Ok(tags) => {
            if json {
                print_json(&tags);
            } else {
                for tag in &tags {
                    println!("{}", tag);
                }
                println!("Insert a tag in the text to produce that sound.");
            }
            EXIT_OK
        }
        Err(e) => report_error(&e),
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Error: {}", e),
    }
}

fn format_languages(languages: &[LanguageInfo]) -> Vec<String> {
    languages
        .iter()
        .map(|l| format!("{:<4} {}", l.code, l.name))
        .collect()
}
