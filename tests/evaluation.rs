// Integration tests for batch evaluation and the interactive loop.

use std::collections::HashMap;

use tempfile::tempdir;
use tokio::io::{AsyncWriteExt, BufReader};

use sentiment_agent::agent::{SentimentClassifier, SentimentService};
use sentiment_agent::core::{AgentError, Result};
use sentiment_agent::evaluation::interactive::{self, Exit};
use sentiment_agent::evaluation::{load_rows, run_batch};
use sentiment_agent::pipelines::sentiment::RawSentiment;

/// Looks each text up in a fixed table of raw labels.
struct TableClassifier(HashMap<&'static str, &'static str>);

impl SentimentClassifier for TableClassifier {
    fn classify(&self, text: &str) -> Result<RawSentiment> {
        self.0
            .get(text)
            .map(|label| RawSentiment {
                label: label.to_string(),
                score: 0.9,
            })
            .ok_or_else(|| AgentError::Inference(format!("no entry for {text:?}")))
    }
}

fn fixture_service() -> SentimentService<TableClassifier> {
    let table = HashMap::from([
        ("I love it", "LABEL_2"),
        ("Best purchase ever", "LABEL_2"),
        ("Works great", "positive"),
        ("It arrived on Tuesday", "LABEL_1"),
        ("The box is blue", "neutral"),
        ("It is okay I guess", "LABEL_0"),
        ("Terrible service", "LABEL_0"),
        ("Broken on arrival", "LABEL_0"),
        ("Never again", "negative"),
    ]);
    SentimentService::new(TableClassifier(table), 512)
}

const FIXTURE: &str = "\
text,expected_sentiment
I love it,positive
Best purchase ever,pos
Works great,1
It arrived on Tuesday,neutral
The box is blue,Neutral
It is okay I guess,neut
Terrible service,negative
Broken on arrival,NEG
Never again,0
";

#[test]
fn nine_row_fixture_scores_eight_of_nine() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("cases.csv");
    let output = dir.path().join("out.csv");
    std::fs::write(&input, FIXTURE).unwrap();

    let evaluation = run_batch(&fixture_service(), &input, &output).unwrap();
    let report = &evaluation.report;

    assert_eq!((report.correct, report.total), (8, 9));
    assert_eq!(report.confusion, [[3, 0, 0], [0, 2, 1], [0, 0, 3]]);
    assert!(report.to_string().starts_with("Overall Accuracy: 88.89%"));

    let [pos, neu, neg] = report.per_class;
    assert_eq!(pos.f1, 1.0);
    assert_eq!(neu.support, 3);
    assert_eq!(neg.precision, 0.75);

    // The output keeps expected labels exactly as given.
    let written = load_rows(&output).unwrap();
    assert_eq!(written.len(), 9);
    assert_eq!(written[1].expected_sentiment, "pos");
    assert_eq!(written[1].model_output, "positive");
    assert_eq!(written[5].model_output, "negative");
    assert_eq!(written[0].confidence_score, Some(90.0));
}

#[test]
fn empty_and_failing_rows_become_neutral() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("cases.csv");
    let output = dir.path().join("out.csv");
    std::fs::write(
        &input,
        "text,expected_sentiment\n,neutral\nsomething unseen,positive\n",
    )
    .unwrap();

    let evaluation = run_batch(&fixture_service(), &input, &output).unwrap();
    for row in &evaluation.rows {
        assert_eq!(row.model_output, "neutral");
        assert_eq!(row.confidence_score, Some(0.0));
    }
    assert_eq!(evaluation.report.correct, 1);
}

#[test]
fn missing_input_is_an_error() {
    let dir = tempdir().unwrap();
    let err = run_batch(
        &fixture_service(),
        &dir.path().join("absent.csv"),
        &dir.path().join("out.csv"),
    )
    .unwrap_err();
    assert!(matches!(err, AgentError::Csv(_)));
}

#[tokio::test]
async fn interactive_loop_stops_at_quit_and_saves() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("session.csv");
    let input = BufReader::new(&b"I love it\n\n   \nNever again\nQUIT\nWorks great\n"[..]);
    let mut out = Vec::new();

    let session = interactive::run(
        &fixture_service(),
        input,
        &mut out,
        std::future::pending(),
        &output,
    )
    .await
    .unwrap();

    assert_eq!(session.exit, Exit::Quit);
    assert_eq!(session.rows.len(), 2);
    assert_eq!(session.rows[1].text.as_deref(), Some("Never again"));
    assert!(session.rows.iter().all(|r| r.expected_sentiment.is_empty()));

    let printed = String::from_utf8(out).unwrap();
    assert!(printed.contains("\"model_output\": \"positive\""));
    assert!(printed.contains("Results saved to"));

    let saved = std::fs::read_to_string(&output).unwrap();
    assert_eq!(
        saved,
        "text,expected_sentiment,model_output,confidence_score\n\
         I love it,,positive,90.0\n\
         Never again,,negative,90.0\n"
    );
}

#[tokio::test]
async fn interactive_loop_appends_to_existing_output() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("session.csv");

    for _ in 0..2 {
        let input = BufReader::new(&b"Works great\nexit\n"[..]);
        interactive::run(
            &fixture_service(),
            input,
            &mut std::io::sink(),
            std::future::pending(),
            &output,
        )
        .await
        .unwrap();
    }

    let saved = std::fs::read_to_string(&output).unwrap();
    assert_eq!(saved.matches("text,expected_sentiment").count(), 1);
    assert_eq!(saved.lines().count(), 3);
}

#[tokio::test]
async fn interrupt_saves_partial_results() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("partial.csv");

    // The writer half stays open, so once the buffered lines are consumed the
    // reader blocks and only the interrupt can end the loop.
    let (mut writer, reader) = tokio::io::duplex(1024);
    writer.write_all(b"Terrible service\nThe box is blue\n").await.unwrap();

    let session = interactive::run(
        &fixture_service(),
        BufReader::new(reader),
        &mut std::io::sink(),
        async {},
        &output,
    )
    .await
    .unwrap();

    assert_eq!(session.exit, Exit::Interrupted);
    assert_eq!(session.rows.len(), 2);
    let saved = load_rows(&output).unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[0].model_output, "negative");
    drop(writer);
}

#[tokio::test]
async fn nothing_is_written_without_input() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("empty.csv");

    let session = interactive::run(
        &fixture_service(),
        BufReader::new(&b""[..]),
        &mut std::io::sink(),
        std::future::pending(),
        &output,
    )
    .await
    .unwrap();

    assert_eq!(session.exit, Exit::Eof);
    assert!(!output.exists());
}

#[tokio::test]
async fn unreadable_line_still_saves_earlier_rows() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("partial.csv");
    let input = BufReader::new(&b"I love it\nNever again\n\xff\xfe\nquit\n"[..]);

    let err = interactive::run(
        &fixture_service(),
        input,
        &mut std::io::sink(),
        std::future::pending(),
        &output,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AgentError::Io(_)));

    let saved = load_rows(&output).unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[0].model_output, "positive");
    assert_eq!(saved[1].model_output, "negative");
}

#[tokio::test]
async fn detached_reader_yields_lines_then_eof() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("session.csv");
    let input = interactive::detached_reader(std::io::Cursor::new(b"Works great\nI love it\n".to_vec()))
        .unwrap();

    let session = interactive::run(
        &fixture_service(),
        input,
        &mut std::io::sink(),
        std::future::pending(),
        &output,
    )
    .await
    .unwrap();

    assert_eq!(session.exit, Exit::Eof);
    assert_eq!(session.rows.len(), 2);
}

/// A reader whose `read` blocks until its sender goes away.
struct Stalled(std::sync::mpsc::Receiver<()>);

impl std::io::Read for Stalled {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        let _ = self.0.recv();
        Ok(0)
    }
}

#[test]
fn interrupt_ends_session_while_a_read_is_blocked() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("stalled.csv");
    let (_hold, rx) = std::sync::mpsc::channel::<()>();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .build()
        .unwrap();
    let session = runtime.block_on(async {
        let input = interactive::detached_reader(Stalled(rx)).unwrap();
        interactive::run(
            &fixture_service(),
            input,
            &mut std::io::sink(),
            async {},
            &output,
        )
        .await
        .unwrap()
    });
    // The blocked read lives on a detached thread, so shutdown returns.
    drop(runtime);

    assert_eq!(session.exit, Exit::Interrupted);
    assert!(session.rows.is_empty());
}
