use std::fs;
use std::io;
use std::path::Path;

use rand::Rng;

use crate::models::config::{StreamConfig, PAIR_CODE_DIGITS};
use crate::models::error::StreamError;
use crate::models::format::FormatDescriptor;

/// Configuration as loaded at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedConfig {
    pub config: StreamConfig,
    /// False when a fresh config could not be written; the pair code then
    /// only lives for this process.
    pub persisted: bool,
}

/// Random numeric pair code, zero-padded to six digits.
pub fn generate_pair_code() -> String {
    let code: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:0width$}", code, width = PAIR_CODE_DIGITS)
}

/// Read the config file at `path`, or create one with defaults.
///
/// File layout, one value per line:
/// ```text
/// 482913
/// 5540
/// pcm 16 48000
/// ```
pub fn load_or_create(path: &Path) -> Result<LoadedConfig, StreamError> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let config = parse(&contents)?;
            log::info!("loaded configuration from {}", path.display());
            Ok(LoadedConfig {
                config,
                persisted: true,
            })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let config = StreamConfig::default();
            let persisted = match save(path, &config) {
                Ok(()) => {
                    log::info!("created configuration at {}", path.display());
                    true
                }
                Err(e) => {
                    log::warn!(
                        "could not write {} ({}); pair code {} is valid for this session only",
                        path.display(),
                        e,
                        config.pair_code
                    );
                    false
                }
            };
            Ok(LoadedConfig { config, persisted })
        }
        Err(e) => Err(StreamError::Configuration(format!(
            "failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

pub fn save(path: &Path, config: &StreamConfig) -> Result<(), StreamError> {
    let contents = format!("{}\n{}\n{}\n", config.pair_code, config.port, config.format);
    fs::write(path, contents)
        .map_err(|e| StreamError::Configuration(format!("failed to write {}: {}", path.display(), e)))
}

fn parse(contents: &str) -> Result<StreamConfig, StreamError> {
    let mut lines = contents.lines().map(str::trim);
    let mut next = |what: &str| {
        lines
            .next()
            .filter(|line| !line.is_empty())
            .ok_or_else(|| StreamError::Configuration(format!("config file is missing the {}", what)))
    };

    let pair_code = next("pair code")?.to_string();
    let port = next("port")?;
    let port: u16 = port
        .parse()
        .map_err(|_| StreamError::Configuration(format!("invalid port {:?}", port)))?;
    let format: FormatDescriptor = next("audio format")?
        .parse()
        .map_err(|e| StreamError::Configuration(format!("{}", e)))?;

    let config = StreamConfig::new(pair_code, port, format);
    config.validate().map_err(StreamError::Configuration)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::models::format::AudioFormat;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("audio-stream-{}.ini", uuid::Uuid::new_v4()))
    }

    #[test]
    fn pair_codes_are_six_digits() {
        for _ in 0..1000 {
            let code = generate_pair_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn creates_then_reloads_the_same_config() {
        let path = temp_path();
        let created = load_or_create(&path).unwrap();
        assert!(created.persisted);
        assert_eq!(created.config.port, 5540);

        let reloaded = load_or_create(&path).unwrap();
        assert_eq!(reloaded.config, created.config);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn reads_three_line_file() {
        let path = temp_path();
        fs::write(&path, "771203\r\n6000\r\nfloat 32 44100\r\n").unwrap();

        let loaded = load_or_create(&path).unwrap();
        assert_eq!(loaded.config.pair_code, "771203");
        assert_eq!(loaded.config.port, 6000);
        assert_eq!(loaded.config.format.format, AudioFormat::Float);
        assert_eq!(loaded.config.format.sample_rate, 44100);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unwritable_location_falls_back_to_session_config() {
        let path = temp_path().join("missing-dir").join("config.ini");
        let loaded = load_or_create(&path).unwrap();
        assert!(!loaded.persisted);
        assert_eq!(loaded.config.pair_code.len(), 6);
    }

    #[test]
    fn rejects_bad_contents() {
        for contents in ["", "123456\n", "123456\nport\npcm 16 48000\n", "123456\n5540\nmp3 1 2\n"] {
            assert!(
                matches!(parse(contents), Err(StreamError::Configuration(_))),
                "{contents:?}"
            );
        }
    }

    #[test]
    fn rejects_oversized_pair_code() {
        assert!(parse("0123456789abcdefX\n5540\npcm 16 48000\n").is_err());
    }
}
