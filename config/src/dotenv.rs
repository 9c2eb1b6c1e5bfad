//! Parse a `.env` file into a key/value map. Application (never overwriting the
//! live environment) happens in `lib.rs`.

use std::collections::HashMap;
use std::path::Path;

fn dotenv_path(override_dir: Option<&Path>) -> Option<std::path::PathBuf> {
    let dir = override_dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())?;
    let path = dir.join(".env");
    if path.is_file() {
        Some(path)
    } else {
        None
    }
}

/// Minimal .env parser: `KEY=VALUE` lines, `#` comment lines skipped, key and
/// value trimmed. Double-quoted values support `\"`; single quotes are stripped
/// without escapes. No multiline values.
fn parse_dotenv(content: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        let key = k.trim().to_string();
        let value = v.trim().to_string();
        let value = if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
            value[1..value.len() - 1].replace("\\\"", "\"")
        } else {
            value
        };
        let value = value
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .map(|s| s.to_string())
            .unwrap_or(value);
        if !key.is_empty() {
            out.insert(key, value);
        }
    }
    out
}

/// Loads `.env` from `override_dir` or the current directory. Missing file
/// returns an empty map.
pub fn load_env_map(override_dir: Option<&Path>) -> std::io::Result<HashMap<String, String>> {
    let path = match dotenv_path(override_dir) {
        Some(p) => p,
        None => return Ok(HashMap::new()),
    };
    let content = std::fs::read_to_string(&path)?;
    Ok(parse_dotenv(&content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_pairs() {
        let m = parse_dotenv("SMTP_HOST=mail.example\nLLM_MODEL=gpt-4o-mini\n");
        assert_eq!(m.get("SMTP_HOST"), Some(&"mail.example".to_string()));
        assert_eq!(m.get("LLM_MODEL"), Some(&"gpt-4o-mini".to_string()));
    }

    #[test]
    fn comments_and_blank_lines_skipped() {
        let m = parse_dotenv("\n# providers\nWHATSAPP_TOKEN=abc\n  \n");
        assert_eq!(m.len(), 1);
        assert_eq!(m.get("WHATSAPP_TOKEN"), Some(&"abc".to_string()));
    }

    #[test]
    fn quoted_values_unwrapped() {
        let m = parse_dotenv("A=\"hello world\"\nB='single'\nC=\"say \\\"hi\\\"\"");
        assert_eq!(m.get("A"), Some(&"hello world".to_string()));
        assert_eq!(m.get("B"), Some(&"single".to_string()));
        assert_eq!(m.get("C"), Some(&"say \"hi\"".to_string()));
    }

    #[test]
    fn malformed_lines_skipped() {
        let m = parse_dotenv("JUST_A_WORD\n=value_only\nOK=1\n");
        assert_eq!(m.len(), 1);
        assert_eq!(m.get("OK"), Some(&"1".to_string()));
    }

    #[test]
    fn empty_value_kept() {
        let m = parse_dotenv("EMPTY=\nALSO_EMPTY=\"\"\n");
        assert_eq!(m.get("EMPTY"), Some(&"".to_string()));
        assert_eq!(m.get("ALSO_EMPTY"), Some(&"".to_string()));
    }

    #[test]
    fn missing_file_is_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        let m = load_env_map(Some(dir.path())).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn reads_file_from_override_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "MOCK_MODE=true\n").unwrap();
        let m = load_env_map(Some(dir.path())).unwrap();
        assert_eq!(m.get("MOCK_MODE"), Some(&"true".to_string()));
    }
}
