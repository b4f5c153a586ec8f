use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::AppError;

/// Race a fallible future against a cancellation token.
///
/// Returns `AppError::Cancelled` as soon as the token fires; the future is
/// dropped at its next suspension point.
pub async fn run_cancellable<F, T>(cancel: &CancellationToken, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(AppError::Cancelled),
        result = fut => result,
    }
}

/// Collapse runs of blank lines into a single empty line and trim the ends.
///
/// Example: `"a\n\n\n\nb\n"` → `"a\n\nb"`
pub fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if blank_run > 0 {
                out.push('\n');
            }
        }
        out.push_str(line);
        blank_run = 0;
    }
    out
}
