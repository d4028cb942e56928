// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

#[tokio::test]
async fn command_sequencer_substitutes_and_exports_text() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("sent.txt");
    let template = format!(
        r#"printf '%s|%s|%s' "${{target}}" "${{press_enter}}" "$RELAY_SEND_TEXT" > "{}""#,
        out.display()
    );
    let sequencer = CommandSequencer::new(Some(template), None, "sh");

    assert!(sequencer.send_text("hello $world", true, "codex").await);
    let sent = std::fs::read_to_string(&out).unwrap();
    assert_eq!(sent, "codex|1|hello $world");
}

#[tokio::test]
async fn command_sequencer_reports_failure() {
    let sequencer = CommandSequencer::new(Some("exit 1".into()), None, "sh");
    assert!(!sequencer.send_text("x", false, "t").await);
}

#[tokio::test]
async fn unconfigured_sequencer_does_not_send() {
    let sequencer = CommandSequencer::new(None, None, "sh");
    assert!(!sequencer.send_image(Path::new("a.png"), true, "t").await);
}

#[tokio::test]
async fn fake_sequencer_scripts_results() {
    let fake = FakeSequencer::new();
    fake.script(&[false]);
    assert!(!fake.send_text("a", true, "t1").await);
    assert!(fake.send_text("b", false, "t2").await);
    assert_eq!(fake.calls().len(), 2);
    assert_eq!(
        fake.calls()[1],
        SendCall::Text { text: "b".into(), press_enter: false, target: "t2".into() }
    );
}
