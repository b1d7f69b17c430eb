//! Interactive read loop

use crate::orchestrator::Orchestrator;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

const BANNER: &str = "Intent-routed Q&A. Ask a question, or type 'exit' to quit.";
const PROMPT: &str = "You > ";

fn is_exit(line: &str) -> bool {
    let line = line.trim();
    line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit")
}

/// Answer questions line by line until EOF or `exit`/`quit`.
///
/// A failed turn is reported and the loop carries on.
pub async fn run_repl<R, W>(
    orchestrator: &Orchestrator,
    input: R,
    mut output: W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    output.write_all(format!("{BANNER}\n").as_bytes()).await?;

    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if is_exit(&line) {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }

        match orchestrator.answer(question).await {
            Ok(outcome) => {
                tracing::info!(
                    label = %outcome.label,
                    pipeline = %outcome.kind,
                    messages = outcome.state.messages().len(),
                    "Turn answered"
                );
                let reply = format!("Selected route: {}\nAI > {}\n\n", outcome.label, outcome.answer);
                output.write_all(reply.as_bytes()).await?;
            }
            Err(e) => {
                tracing::error!(error = %e, "Turn failed");
                output
                    .write_all(format!("Sorry, that question failed: {e}\n\n").as_bytes())
                    .await?;
            }
        }
    }

    output.write_all(b"Goodbye!\n").await?;
    output.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Classifier, IntentLabel};
    use crate::dispatch::Dispatcher;
    use crate::llm::LlmError;
    use crate::pipeline::GeneralAnswerPipeline;
    use crate::testing::MockLlmClient;
    use std::sync::Arc;

    fn orchestrator(llm: Arc<MockLlmClient>) -> Orchestrator {
        let dispatcher = Dispatcher::builder()
            .bind(
                IntentLabel::GeneralLlm,
                Arc::new(GeneralAnswerPipeline::new(llm.clone())),
            )
            .build()
            .unwrap();
        Orchestrator::new(Classifier::new(llm), dispatcher)
    }

    #[test]
    fn test_exit_words() {
        assert!(is_exit("exit"));
        assert!(is_exit("  QUIT \n"));
        assert!(!is_exit("exit now"));
    }

    #[tokio::test]
    async fn test_loop_answers_and_survives_failures() {
        let llm = Arc::new(MockLlmClient::new("test-model"));
        llm.queue_text("general_llm");
        llm.queue_text("Hello!");
        llm.queue_text("general_llm");
        llm.queue_error(LlmError::network("connection reset"));
        llm.queue_text("general_llm");
        llm.queue_text("Still here.");

        let input: &[u8] = b"hello\n\n   \nsecond\nthird\nExit\nnever asked\n";
        let mut output = Vec::new();
        run_repl(&orchestrator(llm.clone()), input, &mut output)
            .await
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.starts_with(BANNER));
        assert!(text.contains("Selected route: general_llm\nAI > Hello!"));
        assert!(text.contains("Sorry, that question failed"));
        assert!(text.contains("AI > Still here."));
        assert!(text.ends_with("Goodbye!\n"));
        // Blank lines and everything after exit never reach the model
        assert_eq!(llm.recorded_requests().len(), 6);
    }

    #[tokio::test]
    async fn test_eof_ends_loop() {
        let llm = Arc::new(MockLlmClient::new("test-model"));
        let input: &[u8] = b"";
        let mut output = Vec::new();
        run_repl(&orchestrator(llm.clone()), input, &mut output)
            .await
            .unwrap();
        assert!(llm.recorded_requests().is_empty());
    }
}
