use crate::error::ResolveError;
use crate::recovery::url_match::first_url;

/// Placeholder substituted with the target URL in scripted lines and commands.
pub const URL_PLACEHOLDER: &str = "{url}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Next stdout chunk is answered with `script[cursor]`.
    Sending { cursor: usize },
    /// Every scripted line was sent; the next stdout chunk carries the result.
    AwaitingResult,
    Done(String),
    Failed,
}

/// What the driver should do after feeding a stdout chunk to the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStep {
    Send(String),
    Resolved(String),
    Idle,
}

/// One scripted dialogue with the recovery tool.
///
/// The tool has no framing: each stdout chunk is taken as the prompt for the
/// next scripted line, and the first chunk after the script is exhausted is
/// scanned for the manifest URL.
#[derive(Debug)]
pub struct RecoveryJob {
    target_url: String,
    script: Vec<String>,
    state: JobState,
    stdout: String,
}

impl RecoveryJob {
    pub fn new(target_url: impl Into<String>, script: &[String]) -> Self {
        let target_url = target_url.into();
        let script: Vec<String> = script
            .iter()
            .map(|line| line.replace(URL_PLACEHOLDER, &target_url))
            .collect();
        let state = if script.is_empty() {
            JobState::AwaitingResult
        } else {
            JobState::Sending { cursor: 0 }
        };

        Self {
            target_url,
            script,
            state,
            stdout: String::new(),
        }
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    /// Number of scripted lines handed out so far.
    pub fn sent(&self) -> usize {
        match self.state {
            JobState::Sending { cursor } => cursor,
            _ => self.script.len(),
        }
    }

    /// Everything the tool printed on stdout.
    pub fn output(&self) -> &str {
        &self.stdout
    }

    pub fn on_stdout(&mut self, chunk: &str) -> Result<JobStep, ResolveError> {
        self.stdout.push_str(chunk);

        match self.state {
            JobState::Sending { cursor } => {
                let line = self.script[cursor].clone();
                let next = cursor + 1;
                self.state = if next == self.script.len() {
                    JobState::AwaitingResult
                } else {
                    JobState::Sending { cursor: next }
                };
                Ok(JobStep::Send(line))
            }
            JobState::AwaitingResult => match first_url(chunk) {
                Some(url) => {
                    let url = url.to_string();
                    self.state = JobState::Done(url.clone());
                    Ok(JobStep::Resolved(url))
                }
                None => {
                    self.state = JobState::Failed;
                    Err(ResolveError::MatchNotFound)
                }
            },
            JobState::Done(_) | JobState::Failed => Ok(JobStep::Idle),
        }
    }

    pub fn fail(&mut self) {
        if !matches!(self.state, JobState::Done(_)) {
            self.state = JobState::Failed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn answers_each_chunk_then_reads_result() {
        let mut job = RecoveryJob::new(
            "https://twitch.tv/videos/42",
            &script(&["3", "3", "{url}"]),
        );

        assert_eq!(job.on_stdout("menu").unwrap(), JobStep::Send("3".into()));
        assert_eq!(job.on_stdout("submenu").unwrap(), JobStep::Send("3".into()));
        assert_eq!(
            job.on_stdout("Enter Twitch URL: ").unwrap(),
            JobStep::Send("https://twitch.tv/videos/42".into())
        );
        assert_eq!(job.state(), &JobState::AwaitingResult);
        assert_eq!(job.sent(), 3);

        let step = job
            .on_stdout("done: https://cdn.example.com/x/y.m3u8 end")
            .unwrap();
        assert_eq!(step, JobStep::Resolved("https://cdn.example.com/x/y.m3u8".into()));
        assert_eq!(
            job.state(),
            &JobState::Done("https://cdn.example.com/x/y.m3u8".into())
        );
        assert!(job.output().starts_with("menusubmenu"));
    }

    #[test]
    fn empty_script_treats_first_chunk_as_result() {
        let mut job = RecoveryJob::new("https://twitch.tv/videos/1", &[]);
        assert_eq!(job.state(), &JobState::AwaitingResult);
        assert_eq!(
            job.on_stdout("https://a.example.com/b.m3u8").unwrap(),
            JobStep::Resolved("https://a.example.com/b.m3u8".into())
        );
    }

    #[test]
    fn terminal_chunk_without_url_fails() {
        let mut job = RecoveryJob::new("https://twitch.tv/videos/1", &script(&["1"]));
        job.on_stdout("prompt").unwrap();
        let err = job.on_stdout("An error occurred: 'NoneType'").unwrap_err();
        assert!(matches!(err, ResolveError::MatchNotFound));
        assert_eq!(job.state(), &JobState::Failed);
        assert_eq!(job.on_stdout("more").unwrap(), JobStep::Idle);
    }

    #[test]
    fn fail_keeps_done_state() {
        let mut job = RecoveryJob::new("u", &[]);
        job.on_stdout("https://a.example.com/x").unwrap();
        job.fail();
        assert!(matches!(job.state(), JobState::Done(_)));
    }
}
