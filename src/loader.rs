use crate::config::{Config, MalformedPolicy};
use crate::error::{Result, SubmythError};
use crate::fs::FileSystem;
use crate::project::{ProjectFile, SubtitleState};
use crate::subtitle::SubtitleDocument;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// What happened to a parse request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Started,
    AlreadyParsed,
    InFlight,
    NotSubtitle,
}

/// A finished background parse, keyed by the file's full path.
#[derive(Debug)]
pub struct Completion {
    pub path: PathBuf,
    pub result: Result<SubtitleDocument>,
}

/// Parses subtitle files in the background, at most `parse_workers` at once.
///
/// Each dispatched parse owns a oneshot channel; its result is handed out
/// exactly once by [`ParseScheduler::poll`] or [`ParseScheduler::wait_all`].
/// Must be used from within a tokio runtime.
pub struct ParseScheduler {
    fs: Arc<dyn FileSystem>,
    policy: MalformedPolicy,
    semaphore: Arc<Semaphore>,
    pending: HashMap<PathBuf, oneshot::Receiver<Result<SubtitleDocument>>>,
}

impl ParseScheduler {
    pub fn new(fs: Arc<dyn FileSystem>, config: &Config) -> Self {
        Self {
            fs,
            policy: config.malformed_blocks,
            semaphore: Arc::new(Semaphore::new(config.parse_workers.max(1))),
            pending: HashMap::new(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Start parsing `file` unless it is parsed or already being parsed.
    pub fn request(&mut self, file: &mut ProjectFile) -> Dispatch {
        let path = file.path();
        let Some(state) = file.subtitle_state_mut() else {
            return Dispatch::NotSubtitle;
        };

        match state {
            SubtitleState::Parsed(_) => return Dispatch::AlreadyParsed,
            SubtitleState::Parsing => return Dispatch::InFlight,
            SubtitleState::Unparsed => {}
        }

        *state = SubtitleState::Parsing;

        // Same path requested through another project: share the running parse.
        if self.pending.contains_key(&path) {
            return Dispatch::InFlight;
        }

        let (tx, rx) = oneshot::channel();
        let fs = self.fs.clone();
        let policy = self.policy;
        let sem = self.semaphore.clone();
        let task_path = path.clone();

        tokio::spawn(async move {
            let result = match sem.acquire_owned().await {
                Ok(_permit) => {
                    debug!("Parsing {}", task_path.display());
                    let blocking_path = task_path.clone();
                    tokio::task::spawn_blocking(move || {
                        parse_file(fs.as_ref(), &blocking_path, policy)
                    })
                    .await
                    .unwrap_or_else(|e| {
                        Err(SubmythError::ParseTask {
                            path: task_path.clone(),
                            reason: e.to_string(),
                        })
                    })
                }
                Err(_) => Err(SubmythError::ParseTask {
                    path: task_path.clone(),
                    reason: "worker pool closed".to_string(),
                }),
            };
            // The scheduler may have been dropped; nobody is waiting then.
            let _ = tx.send(result);
        });

        info!("Dispatched parse of {}", path.display());
        self.pending.insert(path, rx);
        Dispatch::Started
    }

    /// Collect parses that have finished, without waiting.
    pub fn poll(&mut self) -> Vec<Completion> {
        let mut done = Vec::new();
        self.pending.retain(|path, rx| match rx.try_recv() {
            Ok(result) => {
                done.push(Completion {
                    path: path.clone(),
                    result,
                });
                false
            }
            Err(TryRecvError::Empty) => true,
            Err(TryRecvError::Closed) => {
                done.push(Completion {
                    path: path.clone(),
                    result: Err(dropped(path)),
                });
                false
            }
        });
        done
    }

    /// Wait for every in-flight parse to finish.
    pub async fn wait_all(&mut self) -> Vec<Completion> {
        let pending = std::mem::take(&mut self.pending);
        let mut done = Vec::with_capacity(pending.len());
        for (path, rx) in pending {
            let result = rx.await.unwrap_or_else(|_| Err(dropped(&path)));
            done.push(Completion { path, result });
        }
        done
    }
}

fn dropped(path: &Path) -> SubmythError {
    SubmythError::ParseTask {
        path: path.to_path_buf(),
        reason: "worker dropped its result".to_string(),
    }
}

/// Read and parse one subtitle file.
pub fn parse_file(fs: &dyn FileSystem, path: &Path, policy: MalformedPolicy) -> Result<SubtitleDocument> {
    let raw = fs.read_to_string(path)?;
    SubtitleDocument::parse(&raw, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;

    const SRT: &str = "1\n00:00:01,000 --> 00:00:02,000\nHi\n\n";

    fn scheduler(fs: Arc<MemoryFs>) -> ParseScheduler {
        ParseScheduler::new(fs, &Config::default())
    }

    #[tokio::test]
    async fn test_parse_once() {
        let fs = Arc::new(MemoryFs::new().with_file("/x/a.srt", SRT));
        let mut sched = scheduler(fs);
        let mut file = ProjectFile::subtitle("a.srt", "/x");

        assert_eq!(sched.request(&mut file), Dispatch::Started);
        assert_eq!(sched.request(&mut file), Dispatch::InFlight);
        assert_eq!(sched.in_flight(), 1);

        let mut done = sched.wait_all().await;
        assert_eq!(done.len(), 1);
        let completion = done.pop().unwrap();
        assert_eq!(completion.path, PathBuf::from("/x/a.srt"));
        file.finish_parse(completion.result.ok());

        assert!(file.is_parsed());
        assert_eq!(sched.request(&mut file), Dispatch::AlreadyParsed);
        assert_eq!(sched.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failed_parse_can_be_retried() {
        let fs = Arc::new(MemoryFs::new().with_file("/x/a.srt", "garbage\nno timing\n\n"));
        let mut sched = scheduler(fs.clone());
        let mut file = ProjectFile::subtitle("a.srt", "/x");

        sched.request(&mut file);
        let completion = sched.wait_all().await.pop().unwrap();
        assert!(matches!(completion.result, Err(SubmythError::Parse { block: 1, .. })));
        file.finish_parse(completion.result.ok());
        assert!(!file.is_parsed());

        fs.insert("/x/a.srt", SRT);
        assert_eq!(sched.request(&mut file), Dispatch::Started);
        let completion = sched.wait_all().await.pop().unwrap();
        file.finish_parse(completion.result.ok());
        assert_eq!(file.document().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let mut sched = scheduler(Arc::new(MemoryFs::new()));
        let mut file = ProjectFile::subtitle("gone.srt", "/x");
        sched.request(&mut file);
        let completion = sched.wait_all().await.pop().unwrap();
        assert!(matches!(completion.result, Err(SubmythError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_media_is_not_parsed() {
        let mut sched = scheduler(Arc::new(MemoryFs::new()));
        let mut file = ProjectFile::media("a.wav", "/x");
        assert_eq!(sched.request(&mut file), Dispatch::NotSubtitle);
        assert_eq!(sched.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_same_path_shares_one_parse() {
        let fs = Arc::new(MemoryFs::new().with_file("/x/a.srt", SRT));
        let mut sched = scheduler(fs);
        let mut first = ProjectFile::subtitle("a.srt", "/x");
        let mut second = ProjectFile::subtitle("a.srt", "/x");

        assert_eq!(sched.request(&mut first), Dispatch::Started);
        assert_eq!(sched.request(&mut second), Dispatch::InFlight);
        assert!(matches!(second.subtitle_state(), Some(SubtitleState::Parsing)));
        assert_eq!(sched.wait_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_poll_eventually_delivers() {
        let fs = Arc::new(MemoryFs::new().with_file("/x/a.srt", SRT).with_file("/x/b.srt", SRT));
        let mut sched = scheduler(fs);
        let mut a = ProjectFile::subtitle("a.srt", "/x");
        let mut b = ProjectFile::subtitle("b.srt", "/x");
        sched.request(&mut a);
        sched.request(&mut b);

        let mut delivered = Vec::new();
        for _ in 0..200 {
            delivered.extend(sched.poll());
            if sched.in_flight() == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        assert_eq!(delivered.len(), 2);
        assert!(delivered.iter().all(|c| c.result.is_ok()));
        assert!(sched.poll().is_empty());
    }
}
