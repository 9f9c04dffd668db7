//! Model-independent autoregressive decode loop.

use crate::error::RuntimeError;
use crate::stop::{FinishReason, StopCondition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOutput {
    /// Prompt ids followed by the generated continuation.
    pub tokens: Vec<u32>,
    pub prompt_tokens: usize,
    pub finish_reason: FinishReason,
}

impl DecodeOutput {
    pub fn generated(&self) -> &[u32] {
        &self.tokens[self.prompt_tokens..]
    }
}

/// Run the loop until a stop condition or the total-length cap.
///
/// A prompt that already fills `max_length` is rejected with
/// [`RuntimeError::PromptTooLong`]; the output never exceeds the cap.
///
/// `step(tokens, pos)` must feed `tokens[pos..]` to the model (the earlier
/// positions are already in its cache) and return the next token.
/// `detokenize` is only used on short tails to look for stop strings.
/// `cancelled` is polled before each step.
pub fn run<S, D, C>(
    prompt: Vec<u32>,
    max_length: usize,
    stop: &StopCondition,
    mut step: S,
    detokenize: D,
    cancelled: C,
) -> Result<DecodeOutput, RuntimeError>
where
    S: FnMut(&[u32], usize) -> Result<u32, RuntimeError>,
    D: Fn(&[u32]) -> Result<String, RuntimeError>,
    C: Fn() -> bool,
{
    let prompt_tokens = prompt.len();
    if prompt_tokens >= max_length {
        return Err(RuntimeError::PromptTooLong {
            prompt_tokens,
            max_length,
        });
    }
    let mut tokens = prompt;
    let mut pos = 0;

    let finish_reason = loop {
        if tokens.len() >= max_length {
            break FinishReason::Length;
        }
        if cancelled() {
            return Err(RuntimeError::Cancelled);
        }

        let next = step(&tokens, pos)?;
        pos = tokens.len();
        tokens.push(next);

        if stop.is_eos(next) {
            break FinishReason::Eos;
        }

        let generated = &tokens[prompt_tokens..];
        let window = stop.window().min(generated.len());
        if window > 0 {
            let tail = detokenize(&generated[generated.len() - window..])?;
            if stop.matches_suffix(&tail) {
                break FinishReason::Stop;
            }
        }
    };

    Ok(DecodeOutput {
        tokens,
        prompt_tokens,
        finish_reason,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::RefCell;

    const VOCAB: [&str; 8] = ["<p>", "a", "b", "<|endofturn|>", "<|stop", "|>", "</s>", " "];
    const EOS: u32 = 6;

    fn detok(ids: &[u32]) -> Result<String, RuntimeError> {
        Ok(ids.iter().map(|&i| VOCAB[i as usize]).collect())
    }

    fn scripted(script: Vec<u32>) -> impl FnMut(&[u32], usize) -> Result<u32, RuntimeError> {
        let mut it = script.into_iter();
        move |_, _| Ok(it.next().unwrap_or(1))
    }

    fn stop() -> StopCondition {
        StopCondition::with_eos(vec![EOS])
    }

    #[test]
    fn stops_at_marker_before_cap() {
        let out = run(vec![0, 0], 64, &stop(), scripted(vec![1, 2, 3, 1, 1]), detok, || false)
            .unwrap();
        assert_eq!(out.finish_reason, FinishReason::Stop);
        assert_eq!(out.generated(), &[1, 2, 3]);
        assert_eq!(out.tokens.len(), 5);
    }

    #[test]
    fn detects_marker_split_across_tokens() {
        let out = run(vec![0], 64, &stop(), scripted(vec![1, 4, 5, 1]), detok, || false).unwrap();
        assert_eq!(out.finish_reason, FinishReason::Stop);
        assert_eq!(out.generated(), &[1, 4, 5]);
    }

    #[test]
    fn marker_inside_prompt_does_not_stop() {
        let out = run(vec![3], 4, &stop(), scripted(vec![1, 1, 1]), detok, || false).unwrap();
        assert_eq!(out.finish_reason, FinishReason::Length);
        assert_eq!(out.tokens, vec![3, 1, 1, 1]);
    }

    #[test]
    fn eos_token_ends_generation() {
        let out = run(vec![0], 64, &stop(), scripted(vec![2, EOS, 1]), detok, || false).unwrap();
        assert_eq!(out.finish_reason, FinishReason::Eos);
        assert_eq!(out.generated(), &[2, EOS]);
    }

    #[test]
    fn total_length_never_exceeds_cap() {
        for cap in 4..10 {
            let out = run(vec![0, 0, 0], cap, &stop(), scripted(vec![]), detok, || false).unwrap();
            assert_eq!(out.tokens.len(), cap);
            assert_eq!(out.finish_reason, FinishReason::Length);
        }
    }

    #[test]
    fn prompt_filling_cap_is_rejected() {
        for cap in 1..=3 {
            let calls = RefCell::new(0);
            let err = run(
                vec![0, 0, 0],
                cap,
                &stop(),
                |_, _| {
                    *calls.borrow_mut() += 1;
                    Ok(1)
                },
                detok,
                || false,
            )
            .unwrap_err();
            assert!(matches!(
                err,
                RuntimeError::PromptTooLong { prompt_tokens: 3, max_length } if max_length == cap
            ));
            assert_eq!(*calls.borrow(), 0);
        }
    }

    #[test]
    fn feeds_whole_prompt_then_one_token_per_step() {
        let positions = RefCell::new(Vec::new());
        run(
            vec![0, 0, 0],
            6,
            &stop(),
            |tokens, pos| {
                positions.borrow_mut().push((pos, tokens.len() - pos));
                Ok(1)
            },
            detok,
            || false,
        )
        .unwrap();
        assert_eq!(*positions.borrow(), vec![(0, 3), (3, 1), (4, 1)]);
    }

    #[test]
    fn cancellation_aborts_between_steps() {
        let steps = RefCell::new(0);
        let err = run(
            vec![0],
            64,
            &stop(),
            |_, _| {
                *steps.borrow_mut() += 1;
                Ok(1)
            },
            detok,
            || *steps.borrow() >= 2,
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::Cancelled));
        assert_eq!(*steps.borrow(), 2);
    }

    #[test]
    fn step_errors_propagate() {
        let err = run(
            vec![0],
            64,
            &stop(),
            |_, _| Err(RuntimeError::WorkerShutdown),
            detok,
            || false,
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::WorkerShutdown));
    }
}
