/*! Parser for the `Details` stream of a quarantine container.

Once deobfuscated, the `Details` stream is an INI-like text:

```text
[Details]
DetectionName=EICAR test file
CreationYear=2018
...
[File_0]
OriginalName=C:\Users\john\Downloads\eicar.com
```

Section headers are 3 or more alphanumeric characters (or underscores)
between brackets, and each `key=value` line belongs to the most recent
header. The text is not guaranteed to be well-formed: lines without `=`
are ignored, and so are `key=value` lines that appear before the first
header.
*/

use bstr::{BStr, BString, ByteSlice};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::bytes::Regex;


/// Key/value pairs in a section. Values are kept as raw bytes, as they are
/// not guaranteed to be valid UTF-8.
pub type Section = IndexMap<String, BString>;

/// Sections indexed by name, in the order they appear in the text.
pub type SectionMap = IndexMap<String, Section>;

lazy_static! {
    static ref SECTION_HEADER: Regex =
        Regex::new(r"\[([a-zA-Z0-9_]{3,})\]").unwrap();
}

/// Controls how `key=value` lines are split when the value contains more
/// `=` characters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValueSplit {
    /// Split at the first `=`, the value keeps the remaining ones.
    /// `a=b=c` produces the value `b=c`.
    #[default]
    FirstDelimiter,
    /// Split at every `=` and keep only the text between the first and
    /// the second one. `a=b=c` produces the value `b`. Older reports
    /// were generated this way.
    Legacy,
}

/// Parses the deobfuscated content of a `Details` stream.
///
/// ```
/// # use bup_summary::details;
/// let sections = details::parse(b"[Details]\nCreationYear=2018\n");
/// assert_eq!(sections["Details"]["CreationYear"], "2018");
/// ```
pub fn parse(text: &[u8]) -> SectionMap {
    parse_with(text, ValueSplit::default())
}

/// Like [`parse`], but allows choosing how values are split.
pub fn parse_with(text: &[u8], split: ValueSplit) -> SectionMap {
    text.split(|b| *b == b'\n' || *b == b'\r')
        .fold(ParseState::default(), |state, line| state.feed(line, split))
        .sections
}

/// Returns the value of `key` in `section`, if both exist.
pub fn lookup<'a>(
    sections: &'a SectionMap,
    section: &str,
    key: &str,
) -> Option<&'a BStr> {
    sections.get(section)?.get(key).map(|value| value.as_bstr())
}

#[derive(Default)]
struct ParseState {
    sections: SectionMap,
    current: Option<String>,
}

impl ParseState {
    fn feed(mut self, line: &[u8], split: ValueSplit) -> Self {
        // A repeated header starts over with an empty section.
        if let Some(name) = section_header(line) {
            self.sections.insert(name.clone(), Section::new());
            self.current = Some(name);
        }

        if let Some((key, value)) = split_key_value(line, split) {
            match self.current.as_ref().and_then(|c| self.sections.get_mut(c))
            {
                Some(section) => {
                    section.insert(key, value);
                }
                None => {
                    #[cfg(feature = "logging")]
                    log::debug!("discarding `{}`, no section header yet", key);
                }
            }
        }

        self
    }
}

fn section_header(line: &[u8]) -> Option<String> {
    let captures = SECTION_HEADER.captures(line)?;
    Some(captures[1].to_str_lossy().into_owned())
}

fn split_key_value(line: &[u8], split: ValueSplit) -> Option<(String, BString)> {
    let (key, value) = line.split_once_str("=")?;

    let value = match split {
        ValueSplit::FirstDelimiter => value,
        ValueSplit::Legacy => {
            value.split_once_str("=").map(|(value, _)| value).unwrap_or(value)
        }
    };

    Some((key.to_str_lossy().into_owned(), BString::from(value)))
}
