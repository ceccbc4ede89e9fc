//! Line-based terminal I/O.
//!
//! Every screen talks to the terminal through a [`Console`], which is generic
//! over its reader and writer so screens can be driven from tests.

use crossterm::style::{style, Color, Stylize};
use std::io::{self, BufRead, Write};

/// Semantic text styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Title,
    User,
    Assistant,
    Notice,
    Success,
    Error,
    Info,
}

impl Tone {
    fn color(self) -> Color {
        match self {
            Tone::Title => Color::Magenta,
            Tone::User => Color::Green,
            Tone::Assistant => Color::Cyan,
            Tone::Notice => Color::Yellow,
            Tone::Success => Color::Green,
            Tone::Error => Color::Red,
            Tone::Info => Color::Blue,
        }
    }

    fn bold(self) -> bool {
        matches!(self, Tone::Title)
    }
}

pub struct Console<R, W> {
    input: R,
    output: W,
    color: bool,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W, color: bool) -> Self {
        Self {
            input,
            output,
            color,
        }
    }

    /// Style `text` for display; plain when colour is off.
    pub fn paint(&self, tone: Tone, text: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        let mut styled = style(text).with(tone.color());
        if tone.bold() {
            styled = styled.bold();
        }
        styled.to_string()
    }

    /// Print a full line.
    pub fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.output, "{}", text)
    }

    /// Print a styled line.
    pub fn say(&mut self, tone: Tone, text: &str) -> io::Result<()> {
        let painted = self.paint(tone, text);
        self.line(&painted)
    }

    /// Print without a newline and flush, for streamed output.
    pub fn write(&mut self, text: &str) -> io::Result<()> {
        self.output.write_all(text.as_bytes())?;
        self.output.flush()
    }

    pub fn blank(&mut self) -> io::Result<()> {
        writeln!(self.output)
    }

    /// Horizontal rule.
    pub fn rule(&mut self, tone: Tone, ch: char, width: usize) -> io::Result<()> {
        let rule: String = std::iter::repeat(ch).take(width).collect();
        self.say(tone, &rule)
    }

    /// Show `prompt` and read one line. `None` at end of input.
    pub fn prompt(&mut self, prompt: &str) -> io::Result<Option<String>> {
        write!(self.output, "{} ", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            writeln!(self.output)?;
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    #[cfg(test)]
    pub fn output(&self) -> &W {
        &self.output
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_prompt_reads_trimmed_lines() {
        let mut console = scripted("  hello  \r\nsecond\n");
        assert_eq!(console.prompt(">").unwrap().as_deref(), Some("hello"));
        assert_eq!(console.prompt(">").unwrap().as_deref(), Some("second"));
        assert_eq!(console.prompt(">").unwrap(), None);
        assert!(transcript(&console).starts_with("> > > "));
    }

    #[test]
    fn test_paint_plain_without_color() {
        let console = scripted("");
        assert_eq!(console.paint(Tone::Error, "oops"), "oops");
    }

    #[test]
    fn test_paint_adds_ansi_codes_with_color() {
        let console = Console::new(std::io::Cursor::new(Vec::new()), Vec::new(), true);
        let painted = console.paint(Tone::Title, "hi");
        assert!(painted.contains("hi"));
        assert!(painted.contains('\u{1b}'));
    }

    #[test]
    fn test_rule() {
        let mut console = scripted("");
        console.rule(Tone::Title, '=', 5).unwrap();
        assert_eq!(transcript(&console), "=====\n");
    }
}
