use anyhow::Context;
use serde::Serialize;
use std::io;
use std::path::Path;

/// Deletes `dir` recursively if it exists, then recreates it empty.
pub async fn reset_dir(dir: &Path) -> anyhow::Result<()> {
    if tokio::fs::try_exists(dir)
        .await
        .with_context(|| format!("failed to stat {}", dir.display()))?
    {
        tracing::info!(dir = %dir.display(), "clearing existing directory");
        tokio::fs::remove_dir_all(dir)
            .await
            .with_context(|| format!("failed to remove {}", dir.display()))?;
    }

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(())
}

/// UTF-8 JSON with 4-space indentation. Non-ASCII characters are written as-is.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut ser)
        .context("failed to serialize JSON document")?;
    Ok(buf)
}

pub async fn write_pretty_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let bytes = to_pretty_json(value)?;
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Single-line JSON with `", "` and `": "` separators, e.g. `{"error": "..."}`.
pub fn to_compact_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedCompact);
    value
        .serialize(&mut ser)
        .context("failed to serialize JSON document")?;
    Ok(buf)
}

pub async fn write_compact_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let bytes = to_compact_json(value)?;
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

struct SpacedCompact;

impl serde_json::ser::Formatter for SpacedCompact {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn indents_with_four_spaces_and_keeps_non_ascii() {
        let bytes = to_pretty_json(&json!({"GC": {"Note": "Золото"}})).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "{\n    \"GC\": {\n        \"Note\": \"Золото\"\n    }\n}");
    }

    #[test]
    fn compact_form_keeps_spaces_after_separators() {
        let bytes = to_compact_json(&json!({"error": "No data found for this date in Firebase."})).unwrap();
        assert_eq!(
            bytes,
            br#"{"error": "No data found for this date in Firebase."}"#.to_vec()
        );

        let bytes = to_compact_json(&json!({"a": [1, 2], "b": {"c": "Золото"}})).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a": [1, 2], "b": {"c": "Золото"}}"#
        );
    }

    #[tokio::test]
    async fn reset_dir_removes_stale_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("GC").join("2025-10-14");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("old_file.txt"), "old data").unwrap();

        reset_dir(&dir).await.unwrap();

        assert!(dir.is_dir());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn reset_dir_creates_missing_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a").join("b");
        reset_dir(&dir).await.unwrap();
        assert!(dir.is_dir());
    }
}
