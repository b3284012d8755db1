//! Synthesize CLI subcommand.
//!
//! Sends text to a running server and reports the generated audio. With
//! `--output`, the samples are written as raw little-endian `f32` PCM.

use std::path::{Path, PathBuf};

use super::{connect, report_error, EXIT_FAILURE, EXIT_OK, EXIT_USAGE};
use crate::synthesis::SynthesisParams;

/// Parsed `synthesize` arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizeArgs {
    pub text: String,
    pub params: SynthesisParams,
    pub output: Option<PathBuf>,
}

/// Parse `--text <TEXT> [--temperature F] [--exaggeration F] [--cfg-weight F]
/// [--language ID] [--output FILE]`.
pub fn parse_args(args: &[String]) -> Result<SynthesizeArgs, String> {
    let mut text = None;
    let mut params = SynthesisParams::default();
    let mut output = None;

    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let mut value = || {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{} requires a value", flag))
        };
        match flag.as_str() {
            "--text" => text = Some(value()?),
            "--temperature" => params.temperature = parse_f32(flag, &value()?)?,
            "--exaggeration" => params.exaggeration = parse_f32(flag, &value()?)?,
            "--cfg-weight" => params.cfg_weight = parse_f32(flag, &value()?)?,
            "--language" => params.language_id = value()?,
            "--output" | "-o" => output = Some(PathBuf::from(value()?)),
            other => return Err(format!("unknown option: {}", other)),
        }
    }

    let text = text.ok_or_else(|| "--text is required".to_string())?;
    Ok(SynthesizeArgs {
        text,
        params,
        output,
    })
}

fn parse_f32(flag: &str, value: &str) -> Result<f32, String> {
    value
        .parse::<f32>()
        .map_err(|_| format!("{} expects a number, got {}", flag, value))
}

/// Run `synthesize`. Returns exit code: 0 on success, 1 on failure, 2 on
/// bad arguments, 3 on connection failure.
pub async fn run_synthesize(socket_path: &Path, args: &[String]) -> i32 {
    let parsed = match parse_args(args) {
        Ok(parsed) => parsed,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return EXIT_USAGE;
        }
    };

    let mut client = match connect(socket_path).await {
        Ok(client) => client,
        Err(code) => return code,
    };

    let response = match client.synthesize(&parsed.text, parsed.params).await {
        Ok(response) => response,
        Err(e) => return report_error(&e),
    };

    let duration = if response.sample_rate > 0 {
        response.samples.len() as f64 / response.sample_rate as f64
    } else {
        0.0
    };
    println!(
        "Generated {:.2}s of audio ({} samples @ {} Hz) in {} ms",
        duration,
        response.samples.len(),
        response.sample_rate,
        response.generation_ms
    );

    if let Some(path) = parsed.output {
        let bytes: Vec<u8> = response
            .samples
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        if let Err(e) = std::fs::write(&path, bytes) {
            eprintln!("Error writing {}: {}", path.display(), e);
            return EXIT_FAILURE;
        }
        println!("Wrote {}", path.display());
    }
    EXIT_OK
}
