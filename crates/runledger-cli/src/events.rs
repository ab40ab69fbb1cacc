//! JSONL lifecycle-event adapter: the external runner's reporter hook writes
//! one object per line on our stdin.

use runledger_core::model::Outcome;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum LifecycleEvent {
    Begin {
        planned: u64,
    },
    TestEnd {
        title: String,
        status: Outcome,
        failure: Option<String>,
    },
    End,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_event_kinds() {
        let begin: LifecycleEvent = serde_json::from_str(r#"{"event":"begin","planned":12}"#).unwrap();
        assert!(matches!(begin, LifecycleEvent::Begin { planned: 12 }));

        let end: LifecycleEvent = serde_json::from_str(
            r#"{"event":"testEnd","title":"PHARMA-7 | should X","status":"failed","failure":"boom"}"#,
        )
        .unwrap();
        match end {
            LifecycleEvent::TestEnd { status, failure, .. } => {
                assert_eq!(status, Outcome::Failed);
                assert_eq!(failure.as_deref(), Some("boom"));
            }
            other => panic!("unexpected: {other:?}"),
        }

        let done: LifecycleEvent = serde_json::from_str(r#"{"event":"end"}"#).unwrap();
        assert!(matches!(done, LifecycleEvent::End));
    }
}
