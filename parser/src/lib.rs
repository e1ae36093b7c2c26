//! Line-level grammar for RepRap/Marlin G-code.
//!
//! Each input line is parsed on its own into a [`Line`]: an optional
//! leading `N` line number and trailing `*` checksum are accepted and
//! discarded, parenthesised inline comments are skipped, and a `;` comment
//! runs to the end of the line. Words are `<letter><number>` pairs with
//! the letter upper-cased. Anything else (e.g. `M117 Hello`) is a parse
//! error and left for the caller to skip.

/// One `<letter><number>` word, e.g. `X12.5`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Word {
    pub letter: char,
    pub value: f64,
}

/// A parsed line: its words in source order plus the `;` comment, if any.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Line {
    pub words: Vec<Word>,
    pub comment: Option<String>,
}

pub type ParseError = peg::error::ParseError<peg::str::LineCol>;

impl Line {
    /// Command word (`G`, `M` or `T`) leading the line, if present.
    pub fn command(&self) -> Option<Word> {
        self.words
            .first()
            .copied()
            .filter(|w| matches!(w.letter, 'G' | 'M' | 'T'))
    }

    /// True when the line's command is `<letter><code>` (`G0` == `G00`).
    pub fn is_command(&self, letter: char, code: u32) -> bool {
        self.command()
            .is_some_and(|w| w.letter == letter && w.value == f64::from(code))
    }

    /// Value of the first parameter word with `letter`, ignoring the command word.
    pub fn param(&self, letter: char) -> Option<f64> {
        let skip = usize::from(self.command().is_some());
        self.words
            .iter()
            .skip(skip)
            .find(|w| w.letter == letter)
            .map(|w| w.value)
    }

    /// A line carrying neither words nor a comment.
    pub fn is_blank(&self) -> bool {
        self.words.is_empty() && self.comment.is_none()
    }
}

peg::parser! {
    grammar gcode() for str {
        rule ws() = quiet!{[' ' | '\t' | '\r']*}

        rule digits() = ['0'..='9']+

        rule number() -> f64
            = n:$(['+' | '-']? (digits() ("." digits()?)? / "." digits()))
            {? n.parse::<f64>().or(Err("number")) }

        rule letter() -> char
            = c:['a'..='z' | 'A'..='Z'] { c.to_ascii_uppercase() }

        rule word() -> Word
            = l:letter() ws() v:number() { Word { letter: l, value: v } }

        rule inline_comment()
            = "(" (!")" [_])* ")"

        rule skipped()
            = (inline_comment() ws())*

        rule line_number()
            = ['N' | 'n'] digits()

        rule checksum()
            = "*" digits()

        rule comment() -> &'input str
            = ";" text:$([_]*) { text }

        pub rule line() -> Line
            = ws() (line_number() ws())? skipped()
              words:(w:word() ws() skipped() { w })*
              (checksum() ws())?
              c:comment()?
              { Line { words, comment: c.map(|t| t.trim().to_owned()) } }
    }
}

/// Parse a single G-code line (without its trailing newline).
pub fn parse_line(input: &str) -> Result<Line, ParseError> {
    gcode::line(input)
}
