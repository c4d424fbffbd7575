use std::io::{self, BufRead, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use thiserror::Error;

#[cfg(test)]
use std::cell::Cell;
#[cfg(test)]
use std::io::Cursor;

pub const PROMPT: &str = "📶 Enter text to encode as QR: ";

/// Exit status for an interrupt outside the prompt, as a shell reports SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

static WAITING_PROMPTS: AtomicUsize = AtomicUsize::new(0);

/// Counts a prompt as waiting for a line until dropped, on every way out.
struct PromptGuard;

impl PromptGuard {
    fn enter() -> Self {
        WAITING_PROMPTS.fetch_add(1, Ordering::SeqCst);
        PromptGuard
    }
}

impl Drop for PromptGuard {
    fn drop(&mut self) {
        WAITING_PROMPTS.fetch_sub(1, Ordering::SeqCst);
    }
}

/// What an interrupt right now should exit with: a clean cancellation while
/// the prompt is waiting, a failure anywhere else.
pub fn interrupt_exit_code() -> i32 {
    exit_code_for_interrupt(WAITING_PROMPTS.load(Ordering::SeqCst) > 0)
}

fn exit_code_for_interrupt(prompting: bool) -> i32 {
    if prompting {
        InputError::Cancelled.exit_code()
    } else {
        INTERRUPTED_EXIT_CODE
    }
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("❌ Canceled by user.")]
    Cancelled,

    #[error("⚠️  No input provided.")]
    Empty,

    #[error("❌ No input detected.")]
    NoInput,

    #[error("❌ Failed to read input: {0}")]
    Read(#[from] io::Error),
}

impl InputError {
    /// Cancellation is a clean exit, everything else is a failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            InputError::Cancelled => 0,
            _ => 1,
        }
    }

    pub fn is_failure_report(&self) -> bool {
        matches!(self, InputError::NoInput | InputError::Read(_))
    }
}

/// Picks the text to encode: the explicit argument, then piped input, then the
/// interactive prompt.
///
/// `interactive` tells whether `reader` is attached to a terminal. When it is
/// not, the whole stream is read as piped input and the prompt is never shown.
pub fn resolve<R, W>(
    explicit: Option<&str>,
    interactive: bool,
    reader: &mut R,
    prompt_out: &mut W,
) -> Result<String, InputError>
where
    R: BufRead,
    W: Write,
{
    if let Some(text) = explicit.filter(|text| !text.trim().is_empty()) {
        debug!("using text from the command line");
        return Ok(text.to_string());
    }

    if !interactive {
        let mut piped = String::new();
        reader.read_to_string(&mut piped)?;

        let piped = piped.trim();
        if piped.is_empty() {
            return Err(InputError::NoInput);
        }

        debug!("using {} bytes of piped input", piped.len());
        return Ok(piped.to_string());
    }

    prompt(reader, prompt_out)
}

fn prompt<R: BufRead, W: Write>(reader: &mut R, out: &mut W) -> Result<String, InputError> {
    write!(out, "{}", PROMPT)?;
    out.flush()?;

    let mut line = String::new();

    let read = {
        let _guard = PromptGuard::enter();
        reader.read_line(&mut line)?
    };

    if read == 0 {
        return Err(InputError::Cancelled);
    }

    let line = line.trim();

    if line.is_empty() {
        return Err(InputError::Empty);
    }

    debug!("using text from the prompt");
    Ok(line.to_string())
}

#[test]
fn explicit_argument_wins_test() {
    for text in &["hello", "hello world", "https://example.com/?q=1", "ünïcødé"] {
        let mut prompt_out: Vec<u8> = Vec::new();

        for interactive in &[true, false] {
            let resolved = resolve(
                Some(*text),
                *interactive,
                &mut Cursor::new("piped content"),
                &mut prompt_out,
            )
            .unwrap();

            assert_eq!(*text, resolved);
        }

        assert!(prompt_out.is_empty());
    }
}

#[test]
fn piped_input_test() {
    let mut prompt_out: Vec<u8> = Vec::new();

    assert_eq!(
        "hello",
        resolve(None, false, &mut Cursor::new("  hello \n"), &mut prompt_out).unwrap()
    );

    assert_eq!(
        "multi\nline",
        resolve(None, false, &mut Cursor::new("\nmulti\nline\n\n"), &mut prompt_out).unwrap()
    );

    assert_eq!(
        "fallback",
        resolve(Some("   "), false, &mut Cursor::new("fallback"), &mut prompt_out).unwrap()
    );

    assert!(prompt_out.is_empty());
}

#[test]
fn no_input_test() {
    let mut prompt_out: Vec<u8> = Vec::new();

    for piped in &["", "  \n\t "] {
        let error = resolve(None, false, &mut Cursor::new(*piped), &mut prompt_out).unwrap_err();

        assert!(matches!(error, InputError::NoInput));
        assert_eq!(1, error.exit_code());
        assert!(error.is_failure_report());
    }

    assert!(prompt_out.is_empty());
}

#[test]
fn prompt_test() {
    let mut prompt_out: Vec<u8> = Vec::new();

    let resolved = resolve(None, true, &mut Cursor::new("  from prompt \nignored\n"), &mut prompt_out)
        .unwrap();

    assert_eq!("from prompt", resolved);
    assert_eq!(PROMPT.as_bytes(), &prompt_out[..]);
}

#[test]
fn prompt_end_of_input_test() {
    let mut prompt_out: Vec<u8> = Vec::new();

    let error = resolve(None, true, &mut Cursor::new(""), &mut prompt_out).unwrap_err();

    assert!(matches!(error, InputError::Cancelled));
    assert_eq!(0, error.exit_code());
    assert!(!error.is_failure_report());
    assert_eq!("❌ Canceled by user.", error.to_string());
}

#[test]
fn prompt_blank_line_test() {
    let mut prompt_out: Vec<u8> = Vec::new();

    let error = resolve(None, true, &mut Cursor::new("   \n"), &mut prompt_out).unwrap_err();

    assert!(matches!(error, InputError::Empty));
    assert_eq!(1, error.exit_code());
    assert!(!error.is_failure_report());
}

#[test]
fn unreadable_pipe_test() {
    let mut prompt_out: Vec<u8> = Vec::new();

    let error = resolve(
        None,
        false,
        &mut Cursor::new(vec![0xff, 0xfe, 0xfd]),
        &mut prompt_out,
    )
    .unwrap_err();

    assert!(matches!(error, InputError::Read(_)));
    assert_eq!(1, error.exit_code());
}

#[cfg(test)]
struct WatchedReader {
    inner: Cursor<&'static str>,
    exit_code_while_reading: Cell<Option<i32>>,
}

#[cfg(test)]
impl Read for WatchedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

#[cfg(test)]
impl BufRead for WatchedReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.exit_code_while_reading.set(Some(interrupt_exit_code()));
        self.inner.fill_buf()
    }

    fn consume(&mut self, amount: usize) {
        self.inner.consume(amount)
    }
}

#[test]
fn interrupt_during_prompt_test() {
    let mut reader = WatchedReader {
        inner: Cursor::new("typed\n"),
        exit_code_while_reading: Cell::new(None),
    };
    let mut prompt_out: Vec<u8> = Vec::new();

    assert_eq!("typed", resolve(None, true, &mut reader, &mut prompt_out).unwrap());
    assert_eq!(Some(0), reader.exit_code_while_reading.get());
}

#[test]
fn exit_code_for_interrupt_test() {
    assert_eq!(0, exit_code_for_interrupt(true));
    assert_eq!(130, exit_code_for_interrupt(false));
}
