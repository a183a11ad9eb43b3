use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, warn};

pub const LIFECYCLE_CHANNEL_CAPACITY: usize = 64;

/// Window process lifecycle, as published by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The process was spawned. It may not have announced yet.
    Opened { name: String },
    /// The process exited. `exit_code` is `None` when killed by a signal.
    Closed { name: String, exit_code: Option<i32> },
}

impl LifecycleEvent {
    pub fn name(&self) -> &str {
        match self {
            Self::Opened { name } | Self::Closed { name, .. } => name,
        }
    }
}

pub fn create_lifecycle_broadcast() -> broadcast::Sender<LifecycleEvent> {
    broadcast::channel(LIFECYCLE_CHANNEL_CAPACITY).0
}

pub fn is_abnormal_exit(exit_code: Option<i32>) -> bool {
    exit_code != Some(0)
}

/// An abnormal exit on a Linux host less than `grace` after opening.
pub fn should_offer_troubleshooting(
    host_os: &str,
    exit_code: Option<i32>,
    elapsed: Duration,
    grace: Duration,
) -> bool {
    host_os == "linux" && is_abnormal_exit(exit_code) && elapsed < grace
}

/// Opens a help page for the operator.
pub trait Troubleshooter: Send + Sync {
    fn open(&self, url: &str);
}

/// Best-effort `xdg-open <url>`.
pub struct XdgOpen;

impl Troubleshooter for XdgOpen {
    fn open(&self, url: &str) {
        match std::process::Command::new("xdg-open")
            .arg(url)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
        {
            Ok(_) => debug!(%url, "opened troubleshooting page"),
            Err(e) => warn!(%url, "could not open troubleshooting page: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_millis(3000);

    #[test]
    fn early_crash_on_linux_offers_help() {
        assert!(should_offer_troubleshooting(
            "linux",
            Some(1),
            Duration::from_secs(2),
            GRACE
        ));
    }

    #[test]
    fn late_crash_does_not() {
        assert!(!should_offer_troubleshooting(
            "linux",
            Some(1),
            Duration::from_secs(5),
            GRACE
        ));
    }

    #[test]
    fn clean_exit_does_not() {
        assert!(!should_offer_troubleshooting(
            "linux",
            Some(0),
            Duration::from_millis(10),
            GRACE
        ));
    }

    #[test]
    fn other_hosts_do_not() {
        for os in ["macos", "windows"] {
            assert!(!should_offer_troubleshooting(
                os,
                Some(1),
                Duration::from_millis(10),
                GRACE
            ));
        }
    }

    #[test]
    fn signal_death_is_abnormal() {
        assert!(is_abnormal_exit(None));
        assert!(is_abnormal_exit(Some(137)));
        assert!(!is_abnormal_exit(Some(0)));
        assert!(should_offer_troubleshooting(
            "linux",
            None,
            Duration::from_millis(10),
            GRACE
        ));
    }

    #[test]
    fn event_names() {
        let opened = LifecycleEvent::Opened { name: "a".into() };
        let closed = LifecycleEvent::Closed {
            name: "b".into(),
            exit_code: Some(0),
        };
        assert_eq!(opened.name(), "a");
        assert_eq!(closed.name(), "b");
    }

    #[tokio::test]
    async fn subscribers_see_events_in_order() {
        let tx = create_lifecycle_broadcast();
        let mut rx = tx.subscribe();
        tx.send(LifecycleEvent::Opened { name: "w".into() }).unwrap();
        tx.send(LifecycleEvent::Closed {
            name: "w".into(),
            exit_code: Some(1),
        })
        .unwrap();
        assert_eq!(rx.recv().await.unwrap(), LifecycleEvent::Opened { name: "w".into() });
        assert!(matches!(
            rx.recv().await.unwrap(),
            LifecycleEvent::Closed { exit_code: Some(1), .. }
        ));
    }
}
