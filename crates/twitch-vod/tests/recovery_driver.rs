//! Recovery driver tests against an in-memory container runtime.
//!
//! The fake tool prints a prompt when attached and another chunk after every
//! line it reads from stdin, which is the pacing the real recovery tool uses.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc;
use tokio::io::{AsyncBufReadExt, BufReader};

use twitch_vod::recovery::ContainerId;
use twitch_vod::{
    AttachedStream, ContainerError, ContainerRuntime, ContainerSpec, ManifestSource, OutputChunk,
    RecoveryConfig, RecoveryDriver, ResolveError,
};

#[derive(Clone, Default)]
struct Calls(Arc<Mutex<Vec<String>>>);

impl Calls {
    fn push(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    fn snapshot(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Scripted stand-in for the container engine and the tool inside it.
struct FakeRuntime {
    calls: Calls,
    stdin_lines: Calls,
    /// Printed on attach.
    greeting: Option<&'static str>,
    /// Printed after each stdin line, in order; silence once exhausted.
    replies: Vec<&'static str>,
    /// Written to stderr right after the greeting.
    stderr_noise: Option<&'static str>,
    /// Close stdout once the replies run out.
    close_after_replies: bool,
    fail_start: bool,
    /// How long `create` takes, like an image pull.
    create_delay: Duration,
}

impl FakeRuntime {
    fn new(greeting: &'static str, replies: Vec<&'static str>) -> Self {
        Self {
            calls: Calls::default(),
            stdin_lines: Calls::default(),
            greeting: Some(greeting),
            replies,
            stderr_noise: None,
            close_after_replies: false,
            fail_start: false,
            create_delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerId, ContainerError> {
        self.calls
            .push(format!("create {} {}", spec.image, spec.command.join(" ")));
        tokio::time::sleep(self.create_delay).await;
        Ok(ContainerId("fake-1".to_string()))
    }

    async fn start(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.calls.push(format!("start {id}"));
        if self.fail_start {
            return Err(ContainerError::command("docker start", "boom"));
        }
        Ok(())
    }

    async fn attach(&self, id: &ContainerId) -> Result<AttachedStream, ContainerError> {
        self.calls.push(format!("attach {id}"));

        let (driver_end, tool_end) = tokio::io::duplex(1024);
        let (tx, rx) = mpsc::unbounded::<Result<OutputChunk, ContainerError>>();

        if let Some(greeting) = self.greeting {
            tx.unbounded_send(Ok(OutputChunk::Stdout(Bytes::from_static(greeting.as_bytes()))))
                .unwrap();
        }
        if let Some(noise) = self.stderr_noise {
            tx.unbounded_send(Ok(OutputChunk::Stderr(Bytes::from_static(noise.as_bytes()))))
                .unwrap();
        }

        let replies = self.replies.clone();
        let stdin_lines = self.stdin_lines.clone();
        let close_after_replies = self.close_after_replies;
        tokio::spawn(async move {
            let mut lines = BufReader::new(tool_end).lines();
            let mut replies = replies.into_iter();
            let mut tx = Some(tx);
            while let Ok(Some(line)) = lines.next_line().await {
                stdin_lines.push(line);
                match replies.next() {
                    Some(reply) => {
                        if let Some(tx) = &tx {
                            let _ = tx.unbounded_send(Ok(OutputChunk::Stdout(Bytes::from_static(
                                reply.as_bytes(),
                            ))));
                        }
                    }
                    None if close_after_replies => {
                        tx.take();
                    }
                    None => {}
                }
            }
        });

        Ok(AttachedStream::new(driver_end, rx.boxed()))
    }

    async fn stop(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.calls.push(format!("stop {id}"));
        Ok(())
    }

    async fn remove(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.calls.push(format!("remove {id}"));
        Ok(())
    }
}

fn config(script: &[&str], timeout: Duration) -> RecoveryConfig {
    RecoveryConfig {
        script: script.iter().map(|s| s.to_string()).collect(),
        timeout,
        ..RecoveryConfig::default()
    }
}

fn teardown_calls(calls: &[String]) -> Vec<&str> {
    calls
        .iter()
        .filter(|c| c.starts_with("stop") || c.starts_with("remove"))
        .map(String::as_str)
        .collect()
}

#[tokio::test]
async fn sends_every_scripted_line_then_reads_terminal_chunk() {
    let runtime = Arc::new(FakeRuntime::new(
        "1) Vod Recovery\n2) Clip Recovery\n3) Other\nChoose an option: ",
        vec![
            "Choose an option: ",
            "Enter Twitch URL: ",
            "done: https://cdn.example.com/x/y.m3u8 end",
        ],
    ));
    let driver = RecoveryDriver::new(
        runtime.clone(),
        config(&["3", "3", "{url}"], Duration::from_secs(5)),
    );

    let url = driver.resolve("12345").await.unwrap();

    assert_eq!(url, "https://cdn.example.com/x/y.m3u8");
    assert_eq!(
        runtime.stdin_lines.snapshot(),
        ["3", "3", "https://twitch.tv/videos/12345"]
    );
    let calls = runtime.calls.snapshot();
    assert_eq!(calls[0], "create twitch-vod-recovery python vod_recovery.py");
    assert_eq!(teardown_calls(&calls), ["stop fake-1", "remove fake-1"]);
}

#[tokio::test]
async fn stderr_output_does_not_advance_the_script() {
    let mut fake = FakeRuntime::new(
        "Choose an option: ",
        vec!["https://cdn.example.com/stderr/ok.m3u8"],
    );
    fake.stderr_noise = Some("DeprecationWarning: something https://noise.example.com/x");
    let runtime = Arc::new(fake);
    let driver = RecoveryDriver::new(runtime.clone(), config(&["1"], Duration::from_secs(5)));

    let url = driver.recover("https://twitch.tv/videos/1").await.unwrap();

    assert_eq!(url, "https://cdn.example.com/stderr/ok.m3u8");
    assert_eq!(runtime.stdin_lines.snapshot(), ["1"]);
}

#[tokio::test]
async fn url_argument_image_resolves_from_first_chunk() {
    let runtime = Arc::new(FakeRuntime::new(
        "\n\u{1b}[92m\u{2713} before qualities: https://d1.cloudfront.net/abc_1/chunked/index-dvr.m3u8\u{1b}[0m\n",
        vec![],
    ));
    let driver = RecoveryDriver::new(
        runtime.clone(),
        RecoveryConfig {
            image: "twitch-vod-recovery-v3".to_string(),
            command: vec![
                "python".to_string(),
                "vod_recovery.py".to_string(),
                "{url}".to_string(),
            ],
            script: vec![],
            ..RecoveryConfig::default()
        },
    );

    let url = driver.resolve("777").await.unwrap();

    assert_eq!(url, "https://d1.cloudfront.net/abc_1/chunked/index-dvr.m3u8");
    assert!(runtime.stdin_lines.snapshot().is_empty());
    assert_eq!(
        runtime.calls.snapshot()[0],
        "create twitch-vod-recovery-v3 python vod_recovery.py https://twitch.tv/videos/777"
    );
}

#[tokio::test]
async fn terminal_chunk_without_url_is_match_not_found() {
    let runtime = Arc::new(FakeRuntime::new(
        "Enter Twitch URL: ",
        vec!["An error occurred: 'NoneType' object is not subscriptable"],
    ));
    let driver = RecoveryDriver::new(runtime.clone(), config(&["{url}"], Duration::from_secs(5)));

    let err = driver.resolve("1").await.unwrap_err();

    assert!(matches!(err, ResolveError::MatchNotFound));
    assert_eq!(
        teardown_calls(&runtime.calls.snapshot()),
        ["stop fake-1", "remove fake-1"]
    );
}

#[tokio::test]
async fn silent_tool_times_out_and_is_torn_down() {
    let runtime = Arc::new(FakeRuntime::new("Choose an option: ", vec![]));
    let driver = RecoveryDriver::new(
        runtime.clone(),
        config(&["3", "3", "{url}"], Duration::from_millis(100)),
    );

    let err = driver.resolve("1").await.unwrap_err();

    assert!(matches!(err, ResolveError::RecoveryTimeout(_)));
    assert_eq!(runtime.stdin_lines.snapshot(), ["3"]);
    assert_eq!(
        teardown_calls(&runtime.calls.snapshot()),
        ["stop fake-1", "remove fake-1"]
    );
}

#[tokio::test]
async fn closed_stream_is_container_error() {
    let mut fake = FakeRuntime::new("Choose an option: ", vec![]);
    fake.close_after_replies = true;
    let runtime = Arc::new(fake);
    let driver = RecoveryDriver::new(runtime.clone(), config(&["3", "3"], Duration::from_secs(5)));

    let err = driver.resolve("1").await.unwrap_err();

    assert!(matches!(
        err,
        ResolveError::Container(ContainerError::StreamClosed)
    ));
}

#[tokio::test]
async fn failed_start_still_removes_container() {
    let mut fake = FakeRuntime::new("unused", vec![]);
    fake.fail_start = true;
    let runtime = Arc::new(fake);
    let driver = RecoveryDriver::new(runtime.clone(), config(&[], Duration::from_secs(5)));

    let err = driver.resolve("1").await.unwrap_err();

    assert!(matches!(
        err,
        ResolveError::Container(ContainerError::Command { .. })
    ));
    let calls = runtime.calls.snapshot();
    assert!(!calls.iter().any(|c| c.starts_with("attach")));
    assert_eq!(teardown_calls(&calls), ["stop fake-1", "remove fake-1"]);
}

#[tokio::test]
async fn slow_create_is_torn_down_by_name() {
    let mut fake = FakeRuntime::new("unused", vec![]);
    fake.create_delay = Duration::from_secs(5);
    let runtime = Arc::new(fake);
    let driver = RecoveryDriver::new(runtime.clone(), config(&[], Duration::from_millis(100)));

    let err = driver.resolve("1").await.unwrap_err();

    assert!(matches!(err, ResolveError::RecoveryTimeout(_)));
    let calls = runtime.calls.snapshot();
    let teardown = teardown_calls(&calls);
    assert_eq!(teardown.len(), 2);
    assert!(teardown[0].starts_with("stop vodrec-"));
    assert!(teardown[1].starts_with("remove vodrec-"));
    assert_eq!(teardown[0]["stop ".len()..], teardown[1]["remove ".len()..]);
}
