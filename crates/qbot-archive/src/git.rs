use git2::{
    Commit, Cred, CredentialType, ErrorCode, PushOptions, RemoteCallbacks, Repository, Signature,
};
use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use qbot_core::{SinkError, Transcript, TranscriptSink};

use crate::{document_file_name, render_document, ArchiveError};

/// Directory inside the checkout that holds transcript documents
const TRANSCRIPT_DIR: &str = "transcripts";

/// Credential callbacks are retried by libgit2; stop after this many
const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

/// Commits transcript documents into a git checkout and optionally pushes them
pub struct GitArchive {
    repo_path: PathBuf,
    remote: Option<String>,
    branch: Option<String>,
    token: Option<String>,
}

impl GitArchive {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            remote: None,
            branch: None,
            token: None,
        }
    }

    /// Push to this remote after each commit
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = Some(remote.into());
        self
    }

    /// Branch to commit to and push (defaults to the checkout's current branch).
    /// A branch other than HEAD's is committed without touching the working tree.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Token for HTTPS remotes
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Write, commit and (when a remote is set) push one transcript.
    /// Returns the new commit id.
    pub fn archive(&self, transcript: &Transcript) -> Result<git2::Oid, ArchiveError> {
        let repo = Repository::open(&self.repo_path)
            .map_err(|_| ArchiveError::NotARepo(self.repo_path.display().to_string()))?;

        let file_name = document_file_name(&transcript.session_id)?;
        let contents = render_document(transcript)?;
        let signature = repo
            .signature()
            .or_else(|_| Signature::now("qbot", "qbot@localhost"))?;
        let message = format!("Add transcript {}", transcript.session_id);

        let current = head_branch(&repo);
        let target = self.branch.clone().or_else(|| current.clone());
        let oid = match &target {
            Some(branch) if current.as_deref() != Some(branch.as_str()) => {
                let reference = format!("refs/heads/{}", branch);
                let entry = DocumentEntry {
                    file_name: &file_name,
                    contents: &contents,
                };
                commit_to_reference(&repo, &reference, entry, &signature, &message)?
            }
            _ => {
                let workdir = repo
                    .workdir()
                    .ok_or_else(|| ArchiveError::NotARepo(self.repo_path.display().to_string()))?
                    .to_path_buf();
                let relative = Path::new(TRANSCRIPT_DIR).join(&file_name);
                let absolute = workdir.join(&relative);
                if let Some(parent) = absolute.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&absolute, &contents)?;

                let mut index = repo.index()?;
                index.add_path(&relative)?;
                index.write()?;
                let tree = repo.find_tree(index.write_tree()?)?;

                let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
                let parents: Vec<&Commit> = parent.iter().collect();
                repo.commit(Some("HEAD"), &signature, &signature, &message, &tree, &parents)?
            }
        };
        info!(
            session_id = %transcript.session_id,
            commit = %oid,
            branch = target.as_deref().unwrap_or("HEAD"),
            "Transcript committed"
        );

        if let Some(remote) = &self.remote {
            let branch =
                target.ok_or_else(|| git2::Error::from_str("HEAD is not on a branch"))?;
            self.push(&repo, remote, &branch)?;
        }

        Ok(oid)
    }

    fn push(&self, repo: &Repository, remote_name: &str, branch: &str) -> Result<(), ArchiveError> {
        let mut remote = repo
            .find_remote(remote_name)
            .map_err(|_| ArchiveError::NoRemote(remote_name.to_string()))?;

        let reference = format!("refs/heads/{}", branch);
        let refspec = format!("{}:{}", reference, reference);

        let attempts = Cell::new(0);
        let rejection: Cell<Option<String>> = Cell::new(None);
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(|_url, username, allowed| {
            attempts.set(attempts.get() + 1);
            if attempts.get() > MAX_CREDENTIAL_ATTEMPTS {
                return Err(git2::Error::from_str("authentication failed"));
            }
            if let Some(token) = &self.token {
                if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
                    return Cred::userpass_plaintext("x-access-token", token);
                }
            }
            if allowed.contains(CredentialType::SSH_KEY) {
                return Cred::ssh_key_from_agent(username.unwrap_or("git"));
            }
            Cred::default()
        });
        callbacks.push_update_reference(|refname, status| {
            if let Some(message) = status {
                rejection.set(Some(format!("{}: {}", refname, message)));
            }
            Ok(())
        });

        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);

        debug!(remote = %remote_name, reference = %reference, "Pushing transcript archive");
        remote.push(&[refspec.as_str()], Some(&mut options))?;
        drop(options);

        if let Some(message) = rejection.take() {
            return Err(ArchiveError::PushRejected { reference, message });
        }
        info!(remote = %remote_name, reference = %reference, "Transcript archive pushed");
        Ok(())
    }
}

/// One document to place under the transcript directory
struct DocumentEntry<'a> {
    file_name: &'a str,
    contents: &'a str,
}

/// Branch HEAD points at, including an unborn one. None when detached.
fn head_branch(repo: &Repository) -> Option<String> {
    let head = repo.find_reference("HEAD").ok()?;
    head.symbolic_target()?
        .strip_prefix("refs/heads/")
        .map(str::to_string)
}

/// Commit the document onto `reference` by building trees directly, leaving
/// the index and working tree alone.
fn commit_to_reference(
    repo: &Repository,
    reference: &str,
    entry: DocumentEntry<'_>,
    signature: &Signature<'_>,
    message: &str,
) -> Result<git2::Oid, ArchiveError> {
    let parent = match repo.find_reference(reference) {
        Ok(tip) => Some(tip.peel_to_commit()?),
        Err(e) if e.code() == ErrorCode::NotFound => None,
        Err(e) => return Err(e.into()),
    };
    let base = parent.as_ref().map(Commit::tree).transpose()?;
    let existing_dir = base
        .as_ref()
        .and_then(|tree| tree.get_name(TRANSCRIPT_DIR))
        .and_then(|dir| repo.find_tree(dir.id()).ok());

    let blob = repo.blob(entry.contents.as_bytes())?;
    let mut dir = repo.treebuilder(existing_dir.as_ref())?;
    dir.insert(entry.file_name, blob, 0o100644)?;
    let dir_id = dir.write()?;

    let mut root = repo.treebuilder(base.as_ref())?;
    root.insert(TRANSCRIPT_DIR, dir_id, 0o040000)?;
    let tree = repo.find_tree(root.write()?)?;

    let parents: Vec<&Commit> = parent.iter().collect();
    debug!(reference = %reference, "Committing transcript outside the checkout");
    Ok(repo.commit(Some(reference), signature, signature, message, &tree, &parents)?)
}

impl TranscriptSink for GitArchive {
    fn name(&self) -> &str {
        "git"
    }

    fn deliver(&self, transcript: &Transcript) -> Result<(), SinkError> {
        self.archive(transcript).map(|_| ()).map_err(SinkError::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbot_core::{Conversation, QaItem};
    use tempfile::TempDir;

    /// Helper: a fresh checkout with a committer identity configured.
    fn init_checkout(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "Archive Test").unwrap();
        config.set_str("user.email", "archive@example.com").unwrap();
        repo
    }

    fn transcript(session_id: &str) -> Transcript {
        let mut conv = Conversation::new(1);
        conv.append(QaItem::question("What is your product?").unwrap())
            .unwrap();
        conv.append(QaItem::answer("Steel bolts").unwrap()).unwrap();
        conv.finish();
        conv.transcript(session_id)
    }

    #[test]
    fn test_commits_document() {
        let dir = TempDir::new().unwrap();
        let repo = init_checkout(dir.path());
        let archive = GitArchive::new(dir.path());

        let first = archive.archive(&transcript("session-1")).unwrap();
        let second = archive.archive(&transcript("session-2")).unwrap();

        let head = repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(head.id(), second);
        assert_eq!(head.message(), Some("Add transcript session-2"));
        assert_eq!(head.parent_id(0).unwrap(), first);
        assert_eq!(head.author().name(), Some("Archive Test"));

        let tree = head.tree().unwrap();
        assert!(tree
            .get_path(Path::new("transcripts/session-1.json"))
            .is_ok());
        assert!(tree
            .get_path(Path::new("transcripts/session-2.json"))
            .is_ok());
    }

    #[test]
    fn test_not_a_repository() {
        let dir = TempDir::new().unwrap();
        let archive = GitArchive::new(dir.path().join("missing"));
        assert!(matches!(
            archive.archive(&transcript("session-1")),
            Err(ArchiveError::NotARepo(_))
        ));
    }

    #[test]
    fn test_missing_remote() {
        let dir = TempDir::new().unwrap();
        init_checkout(dir.path());
        let archive = GitArchive::new(dir.path()).with_remote("origin");

        let err = archive.archive(&transcript("session-1")).unwrap_err();
        assert!(matches!(err, ArchiveError::NoRemote(name) if name == "origin"));
    }

    #[test]
    fn test_pushes_to_remote() {
        let remote_dir = TempDir::new().unwrap();
        let bare = Repository::init_bare(remote_dir.path()).unwrap();

        let dir = TempDir::new().unwrap();
        let repo = init_checkout(dir.path());
        let url = remote_dir.path().to_str().unwrap();
        repo.remote("origin", url).unwrap();

        let archive = GitArchive::new(dir.path()).with_remote("origin");
        let oid = archive.archive(&transcript("session-1")).unwrap();

        let branch = head_branch(&repo).unwrap();
        let pushed = bare
            .find_reference(&format!("refs/heads/{}", branch))
            .unwrap();
        assert_eq!(pushed.target(), Some(oid));
    }

    #[test]
    fn test_commits_to_configured_branch_off_head() {
        let remote_dir = TempDir::new().unwrap();
        let bare = Repository::init_bare(remote_dir.path()).unwrap();

        let dir = TempDir::new().unwrap();
        let repo = init_checkout(dir.path());
        repo.set_head("refs/heads/main").unwrap();
        let main_tip = GitArchive::new(dir.path())
            .archive(&transcript("session-0"))
            .unwrap();

        let tip = repo.find_commit(main_tip).unwrap();
        repo.branch("work", &tip, false).unwrap();
        repo.set_head("refs/heads/work").unwrap();
        let work_tip = GitArchive::new(dir.path())
            .archive(&transcript("session-work"))
            .unwrap();

        repo.remote("origin", remote_dir.path().to_str().unwrap())
            .unwrap();
        let archive = GitArchive::new(dir.path())
            .with_remote("origin")
            .with_branch("main");
        let oid = archive.archive(&transcript("session-1")).unwrap();

        let pushed = bare.find_reference("refs/heads/main").unwrap();
        assert_eq!(pushed.target(), Some(oid));

        let commit = repo.find_commit(oid).unwrap();
        assert_eq!(commit.parent_id(0).unwrap(), main_tip);
        let tree = commit.tree().unwrap();
        assert!(tree
            .get_path(Path::new("transcripts/session-0.json"))
            .is_ok());
        assert!(tree
            .get_path(Path::new("transcripts/session-1.json"))
            .is_ok());
        assert!(tree
            .get_path(Path::new("transcripts/session-work.json"))
            .is_err());

        // checkout stays on its own branch
        assert_eq!(head_branch(&repo).as_deref(), Some("work"));
        assert_eq!(repo.head().unwrap().target(), Some(work_tip));
        assert!(!dir.path().join("transcripts/session-1.json").exists());
    }

    #[test]
    fn test_sink_name() {
        assert_eq!(GitArchive::new("/tmp/none").name(), "git");
    }
}
