use std::fs;
use std::path::PathBuf;
use tracing::debug;

use qbot_core::{SinkError, Transcript, TranscriptSink};

use crate::ArchiveError;

/// Pretty JSON form of a transcript
pub fn render_document(transcript: &Transcript) -> Result<String, ArchiveError> {
    let mut json = serde_json::to_string_pretty(transcript)?;
    json.push('\n');
    Ok(json)
}

/// `<session_id>.json`, refusing ids that would escape the target directory
pub fn document_file_name(session_id: &str) -> Result<String, ArchiveError> {
    let valid = !session_id.is_empty()
        && session_id != "."
        && session_id != ".."
        && !session_id.contains(&['/', '\\', '\0'][..]);
    if !valid {
        return Err(ArchiveError::InvalidSessionId(session_id.to_string()));
    }
    Ok(format!("{}.json", session_id))
}

/// Writes each transcript to its own JSON file in a directory
pub struct DocumentWriter {
    dir: PathBuf,
}

impl DocumentWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write the document, replacing any earlier one for the session
    pub fn write(&self, transcript: &Transcript) -> Result<PathBuf, ArchiveError> {
        let path = self.dir.join(document_file_name(&transcript.session_id)?);
        fs::create_dir_all(&self.dir)?;
        fs::write(&path, render_document(transcript)?)?;
        debug!(path = %path.display(), "Transcript document written");
        Ok(path)
    }
}

impl TranscriptSink for DocumentWriter {
    fn name(&self) -> &str {
        "document"
    }

    fn deliver(&self, transcript: &Transcript) -> Result<(), SinkError> {
        self.write(transcript).map(|_| ()).map_err(SinkError::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbot_core::{Conversation, QaItem};
    use tempfile::TempDir;

    fn transcript(session_id: &str) -> Transcript {
        let mut conv = Conversation::new(2);
        conv.append(QaItem::question("What is your product?").unwrap())
            .unwrap();
        conv.append(QaItem::answer("Steel bolts").unwrap()).unwrap();
        conv.append(QaItem::question("What is your lead time?").unwrap())
            .unwrap();
        conv.append(QaItem::answer("Two weeks").unwrap()).unwrap();
        conv.finish();
        conv.transcript(session_id)
    }

    #[test]
    fn test_document_shape() {
        let json: serde_json::Value =
            serde_json::from_str(&render_document(&transcript("session-1")).unwrap()).unwrap();

        assert_eq!(json["session_id"], "session-1");
        assert_eq!(json["question_count"], 2);
        assert_eq!(json["answer_count"], 2);
        assert!(json["started_at"].is_string());
        assert!(json["completed_at"].is_string());
        assert_eq!(json["items"][0]["number"], 1);
        assert_eq!(json["items"][0]["question"], "What is your product?");
        assert_eq!(json["items"][1]["answer"], "Two weeks");
    }

    #[test]
    fn test_write_creates_directory() {
        let dir = TempDir::new().unwrap();
        let writer = DocumentWriter::new(dir.path().join("transcripts"));

        let path = writer.write(&transcript("session-1")).unwrap();
        assert_eq!(path.file_name().unwrap(), "session-1.json");

        let parsed: Transcript = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.session_id, "session-1");
        assert_eq!(parsed.items, transcript("session-1").items);
    }

    #[test]
    fn test_rejects_path_like_session_ids() {
        for bad in ["", "..", "../escape", "a/b", "a\\b"] {
            assert!(matches!(
                document_file_name(bad),
                Err(ArchiveError::InvalidSessionId(_))
            ));
        }
        assert_eq!(document_file_name("session-42").unwrap(), "session-42.json");
    }

    #[test]
    fn test_sink_reports_failure() {
        let dir = TempDir::new().unwrap();
        // a file where the directory should be
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, "not a directory").unwrap();

        let writer = DocumentWriter::new(&blocker);
        assert!(writer.deliver(&transcript("session-1")).is_err());
    }
}
