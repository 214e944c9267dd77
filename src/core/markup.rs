//! Typewriter reveal over content with inline `<tag>`...`</tag>` markup.
//!
//! Each emitted character is wrapped in every currently open tag and every
//! pending closing tag, so the revealed buffer is well-formed markup at
//! every tick, not just at the end.

use std::time::Duration;
use thiserror::Error;

use crate::core::timer::Timer;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    #[error("closing tag at character {position} has no matching opening tag")]
    Unbalanced { position: usize },
}

/// Derive the closing form of an opening tag, dropping any `=value`
/// attribute: `<color=#ff0000>` becomes `</color>`.
pub fn closing_tag_for(open_tag: &str) -> String {
    let inner = open_tag
        .strip_prefix('<')
        .and_then(|t| t.strip_suffix('>'))
        .unwrap_or(open_tag);
    let name = inner
        .split(|c: char| c == '=' || c.is_whitespace())
        .next()
        .unwrap_or(inner);
    format!("</{}>", name)
}

/// Characters emitted and completion status after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TypeProgress {
    pub emitted: usize,
    pub finished: bool,
}

/// Incremental, pausable reveal of one node's content.
#[derive(Debug, Clone)]
pub struct Typewriter {
    raw: String,
    chars: Vec<char>,
    cursor: usize,
    open_tags: Vec<String>,
    closing_stack: Vec<String>,
    displayed: String,
    cadence: Timer,
    paused: bool,
    finished: bool,
}

impl Typewriter {
    /// A reveal of `content` emitting one visible character per `interval`.
    pub fn new(content: &str, interval: Duration) -> Self {
        Self {
            raw: content.to_string(),
            chars: content.chars().collect(),
            cursor: 0,
            open_tags: Vec::new(),
            closing_stack: Vec::new(),
            displayed: String::new(),
            cadence: Timer::repeating(interval),
            paused: false,
            finished: false,
        }
    }

    /// The text revealed so far.
    pub fn displayed(&self) -> &str {
        &self.displayed
    }

    /// The unmodified content being revealed.
    pub fn content(&self) -> &str {
        &self.raw
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Tags opened and not yet closed, in open order.
    pub fn open_tags(&self) -> &[String] {
        &self.open_tags
    }

    /// Advance time. Paused reveals ignore the elapsed time entirely.
    pub fn tick(&mut self, delta: Duration) -> Result<TypeProgress, MarkupError> {
        let mut progress = TypeProgress {
            emitted: 0,
            finished: self.finished,
        };
        if self.paused || self.finished {
            return Ok(progress);
        }

        let due = self.cadence.tick(delta);
        for _ in 0..due {
            if self.step()?.is_some() {
                progress.emitted += 1;
            }
            if self.finished {
                break;
            }
        }
        progress.finished = self.finished;
        Ok(progress)
    }

    /// Emit the next visible character, consuming any tags in front of it.
    ///
    /// Returns `None` once the content is exhausted. The reveal finishes as
    /// soon as the last visible character has been emitted.
    pub fn step(&mut self) -> Result<Option<char>, MarkupError> {
        if self.finished {
            return Ok(None);
        }

        let emitted = loop {
            if self.cursor >= self.chars.len() {
                break None;
            }
            if let Some(end) = self.tag_end(self.cursor) {
                self.consume_tag(self.cursor, end)?;
                self.cursor = end + 1;
                continue;
            }

            let c = self.chars[self.cursor];
            self.cursor += 1;

            for tag in &self.open_tags {
                self.displayed.push_str(tag);
            }
            self.displayed.push(c);
            for tag in self.closing_stack.iter().rev() {
                self.displayed.push_str(tag);
            }
            break Some(c);
        };

        if self.next_visible().is_none() {
            self.drain_trailing_tags()?;
            self.finish();
        }
        Ok(emitted)
    }

    /// Jump straight to the full content, discarding remaining characters
    /// and any open-tag state.
    pub fn complete(&mut self) {
        self.displayed = self.raw.clone();
        self.cursor = self.chars.len();
        self.finish();
    }

    fn finish(&mut self) {
        self.finished = true;
        self.cadence.cancel();
        self.open_tags.clear();
        self.closing_stack.clear();
    }

    /// Index of the `>` closing a tag that starts at `start`, if any.
    fn tag_end(&self, start: usize) -> Option<usize> {
        if self.chars.get(start) != Some(&'<') {
            return None;
        }
        self.chars[start..]
            .iter()
            .position(|&c| c == '>')
            .map(|offset| start + offset)
    }

    fn consume_tag(&mut self, start: usize, end: usize) -> Result<(), MarkupError> {
        let tag: String = self.chars[start..=end].iter().collect();
        if tag.starts_with("</") {
            if self.closing_stack.pop().is_none() || self.open_tags.pop().is_none() {
                return Err(MarkupError::Unbalanced { position: start });
            }
        } else {
            self.closing_stack.push(closing_tag_for(&tag));
            self.open_tags.push(tag);
        }
        Ok(())
    }

    fn next_visible(&self) -> Option<usize> {
        let mut i = self.cursor;
        while i < self.chars.len() {
            match self.tag_end(i) {
                Some(end) => i = end + 1,
                None => return Some(i),
            }
        }
        None
    }

    fn drain_trailing_tags(&mut self) -> Result<(), MarkupError> {
        while let Some(end) = self.tag_end(self.cursor) {
            self.consume_tag(self.cursor, end)?;
            self.cursor = end + 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(100);

    fn reveal_all(content: &str) -> Result<Vec<String>, MarkupError> {
        let mut tw = Typewriter::new(content, TICK);
        let mut frames = Vec::new();
        while tw.step()?.is_some() {
            frames.push(tw.displayed().to_string());
        }
        Ok(frames)
    }

    /// Opens never fall behind closes for any tag name, and every open is
    /// closed by the end of the string.
    fn is_well_formed(text: &str) -> bool {
        let mut stack: Vec<String> = Vec::new();
        let mut rest = text;
        while let Some(start) = rest.find('<') {
            let Some(len) = rest[start..].find('>') else {
                break;
            };
            let tag = &rest[start..start + len + 1];
            if let Some(name) = tag.strip_prefix("</") {
                let name = name.trim_end_matches('>');
                match stack.pop() {
                    Some(open) if open == name => {}
                    _ => return false,
                }
            } else {
                stack.push(closing_tag_for(tag)[2..].trim_end_matches('>').to_string());
            }
            rest = &rest[start + len + 1..];
        }
        stack.is_empty()
    }

    #[test]
    fn closing_tag_strips_attribute() {
        assert_eq!(closing_tag_for("<b>"), "</b>");
        assert_eq!(closing_tag_for("<color=#ff0000>"), "</color>");
        assert_eq!(closing_tag_for("<size=40>"), "</size>");
    }

    #[test]
    fn plain_text_reveals_one_char_per_step() {
        let frames = reveal_all("Hi!").unwrap();
        assert_eq!(frames, vec!["H", "Hi", "Hi!"]);
    }

    #[test]
    fn nested_markup_rewraps_every_character() {
        let frames = reveal_all("<b>a<i>b</i></b>c").unwrap();
        assert_eq!(frames[0], "<b>a</b>");
        assert_eq!(frames[1], "<b>a</b><b><i>b</i></b>");
        assert_eq!(frames[2], "<b>a</b><b><i>b</i></b>c");
        for frame in &frames {
            assert!(is_well_formed(frame), "malformed frame: {}", frame);
        }
    }

    #[test]
    fn attribute_tag_is_closed_by_name() {
        let frames = reveal_all("<color=#f00>ok</color>").unwrap();
        assert_eq!(frames.last().unwrap(), "<color=#f00>o</color><color=#f00>k</color>");
    }

    #[test]
    fn finishes_with_last_visible_character() {
        let mut tw = Typewriter::new("ab</b>", TICK);
        assert_eq!(tw.step(), Ok(Some('a')));
        assert!(!tw.is_finished());
        assert_eq!(tw.step(), Err(MarkupError::Unbalanced { position: 2 }));

        let mut tw = Typewriter::new("<b>ab</b>", TICK);
        tw.step().unwrap();
        tw.step().unwrap();
        assert!(tw.is_finished());
        assert!(tw.open_tags().is_empty());
    }

    #[test]
    fn unbalanced_closing_tag_is_an_error() {
        assert_eq!(
            reveal_all("x</b>y"),
            Err(MarkupError::Unbalanced { position: 1 })
        );
    }

    #[test]
    fn lone_angle_bracket_is_literal() {
        let frames = reveal_all("a < b").unwrap();
        assert_eq!(frames.last().unwrap(), "a < b");
    }

    #[test]
    fn tick_respects_interval_and_pause() {
        let mut tw = Typewriter::new("abcd", TICK);
        let p = tw.tick(Duration::from_millis(250)).unwrap();
        assert_eq!(p.emitted, 2);
        assert_eq!(tw.displayed(), "ab");

        tw.pause();
        let p = tw.tick(Duration::from_secs(5)).unwrap();
        assert_eq!(p.emitted, 0);
        assert_eq!(tw.displayed(), "ab");

        tw.resume();
        let p = tw.tick(Duration::from_millis(200)).unwrap();
        assert_eq!(p.emitted, 2);
        assert!(p.finished);
        assert_eq!(tw.displayed(), "abcd");
    }

    #[test]
    fn pause_keeps_open_tag_state() {
        let mut tw = Typewriter::new("<b>abc</b>", TICK);
        tw.step().unwrap();
        tw.pause();
        tw.tick(Duration::from_secs(1)).unwrap();
        assert_eq!(tw.open_tags(), &["<b>".to_string()]);
        tw.resume();
        tw.step().unwrap();
        assert_eq!(tw.displayed(), "<b>a</b><b>b</b>");
    }

    #[test]
    fn complete_shows_raw_content() {
        let mut tw = Typewriter::new("<b>bold</b> text", TICK);
        tw.step().unwrap();
        tw.complete();
        assert!(tw.is_finished());
        assert_eq!(tw.displayed(), "<b>bold</b> text");
        assert!(tw.open_tags().is_empty());
        assert_eq!(tw.tick(Duration::from_secs(1)).unwrap().emitted, 0);
    }

    #[test]
    fn multibyte_characters_reveal_whole() {
        let frames = reveal_all("你好").unwrap();
        assert_eq!(frames, vec!["你", "你好"]);
    }

    #[test]
    fn every_natural_frame_is_well_formed() {
        let content = "<size=30><b>Wait</b>, <i>what</i>?</size> Fine.";
        for frame in reveal_all(content).unwrap() {
            assert!(is_well_formed(&frame), "malformed frame: {}", frame);
        }
    }
}
