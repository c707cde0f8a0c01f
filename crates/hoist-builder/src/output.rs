//! Engine output normalization.

use futures::stream::{self, BoxStream, StreamExt};
use hoist_core::engine::{EngineEvent, EventStream};
use hoist_core::{BuildEvent, Error, Result};
use std::fmt::Write;
use tracing::debug;

/// Render one engine event as a log line.
pub fn normalize(event: &EngineEvent) -> String {
    if let Some(error) = &event.error {
        return format!("Error: {}", error);
    }

    let mut line = String::new();

    if let Some(stream) = &event.stream {
        line.push_str(stream);
    }

    if let Some(status) = &event.status {
        line.push_str(status);
        if let Some(id) = &event.id {
            let _ = write!(line, " ---> {}", id);
        }
        if let Some(detail) = event
            .progress_detail
            .filter(|d| d.current.is_some() || d.total.is_some())
        {
            let _ = write!(line, " Current: {}, ", detail.current.unwrap_or(0));
            if let Some(total) = detail.total {
                let _ = write!(line, " Total: {}", total);
            }
            let _ = write!(line, "\n{}", event.progress.as_deref().unwrap_or_default());
        }
    }

    if let Some(aux) = &event.aux {
        let _ = write!(
            line,
            "ID: {}, Tag: {}, Digest: {}, Size: {}",
            aux.id.as_deref().unwrap_or_default(),
            aux.tag.as_deref().unwrap_or_default(),
            aux.digest.as_deref().unwrap_or_default(),
            aux.size.map(|s| s.to_string()).unwrap_or_default()
        );
    }

    line.trim_end().to_string()
}

/// Map engine events to log events. The first engine-reported error becomes
/// `fail(message)`; blank lines are dropped.
pub fn log_events(
    events: EventStream,
    fail: fn(String) -> Error,
) -> BoxStream<'static, Result<BuildEvent>> {
    events
        .filter_map(move |result| async move {
            match result {
                Ok(event) => match event.error {
                    Some(message) => Some(Err(fail(message))),
                    None => {
                        let line = normalize(&event);
                        if line.trim().is_empty() {
                            None
                        } else {
                            debug!(line = %line, "Engine output");
                            Some(Ok(BuildEvent::log(line)))
                        }
                    }
                },
                Err(Error::Engine(message)) => Some(Err(fail(message))),
                Err(e) => Some(Err(e)),
            }
        })
        .boxed()
}

/// Pass items through until (and including) the first error, then end.
pub fn until_failure<T: Send + 'static>(
    items: BoxStream<'static, Result<T>>,
) -> BoxStream<'static, Result<T>> {
    stream::unfold((items, false), |(mut items, failed)| async move {
        if failed {
            return None;
        }
        let item = items.next().await?;
        let failed = item.is_err();
        Some((item, (items, failed)))
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_core::engine::{AuxDetail, ProgressDetail};

    #[test]
    fn test_stream_passthrough() {
        assert_eq!(
            normalize(&EngineEvent::stream("Step 1/5 : FROM alpine\n")),
            "Step 1/5 : FROM alpine"
        );
    }

    #[test]
    fn test_status_with_progress() {
        let event = EngineEvent {
            status: Some("Pushing".to_string()),
            id: Some("ffc9b21953f4".to_string()),
            progress: Some("[=====>   ]  58.12MB/69.21MB".to_string()),
            progress_detail: Some(ProgressDetail {
                current: Some(58119680),
                total: Some(69212698),
            }),
            ..Default::default()
        };
        assert_eq!(
            normalize(&event),
            "Pushing ---> ffc9b21953f4 Current: 58119680,  Total: 69212698\n[=====>   ]  58.12MB/69.21MB"
        );
    }

    #[test]
    fn test_status_with_empty_progress_detail() {
        let event = EngineEvent {
            status: Some("Waiting".to_string()),
            id: Some("abc".to_string()),
            progress_detail: Some(ProgressDetail::default()),
            ..Default::default()
        };
        assert_eq!(normalize(&event), "Waiting ---> abc");
    }

    #[test]
    fn test_aux() {
        let event = EngineEvent {
            aux: Some(AuxDetail {
                id: None,
                tag: Some("v1".to_string()),
                digest: Some("sha256:beef".to_string()),
                size: Some(1024),
            }),
            ..Default::default()
        };
        assert_eq!(normalize(&event), "ID: , Tag: v1, Digest: sha256:beef, Size: 1024");
    }

    #[test]
    fn test_error_replaces_line() {
        let mut event = EngineEvent::stream("partial");
        event.error = Some("no space left on device".to_string());
        assert_eq!(normalize(&event), "Error: no space left on device");
    }

    #[tokio::test]
    async fn test_log_events_stop_on_error() {
        let events: EventStream = stream::iter(vec![
            Ok(EngineEvent::stream("Step 1/2\n")),
            Ok(EngineEvent::stream("\n")),
            Ok(EngineEvent::error("boom")),
            Ok(EngineEvent::stream("never")),
        ])
        .boxed();

        let items: Vec<_> = until_failure(log_events(events, Error::Build)).collect().await;

        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], Ok(BuildEvent::Log(line)) if line.content == "Step 1/2"));
        assert!(matches!(&items[1], Err(Error::Build(m)) if m == "boom"));
    }

    #[tokio::test]
    async fn test_engine_errors_map_to_phase() {
        let events: EventStream =
            stream::iter(vec![Err(Error::Engine("connection reset".to_string()))]).boxed();
        let items: Vec<_> = log_events(events, Error::Push).collect().await;
        assert!(matches!(&items[0], Err(Error::Push(m)) if m == "connection reset"));
    }
}
