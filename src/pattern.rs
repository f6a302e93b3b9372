//! Path patterns.
//!
//! A pattern is compiled into a regular expression once, when the layer is
//! registered. The syntax is:
//! ```ignore
//!  Syntax       Meaning
//!  :name        named parameter, matches one path segment
//!  :name?       optional named parameter (its leading '/' or '.' too)
//!  :name(re)    named parameter with a custom expression
//!  *            wildcard, captured under the next positional key
//!  (re)         group, captured under the next positional key
//!  ? +          quantifiers applying to the previous character or group
//! ```
//!
//! Matching `/user/:id` and `/files/*`:
//! ```ignore
//!  /user/42               match: id="42"
//!  /user/42/              match: id="42" (unless strict)
//!  /user/42/profile       no match
//!  /files/a/b.txt         match: 0="a/b.txt"
//! ```
use crate::error::{Error, Result};
use crate::params::{ParamKey, Params};

use std::borrow::Cow;

use percent_encoding::percent_decode_str;
use regex::{Regex, RegexBuilder};

/// Options controlling how a pattern is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternOptions {
    /// Match case sensitively.
    pub sensitive: bool,
    /// Do not accept an optional trailing slash.
    pub strict: bool,
    /// The pattern must consume the whole path. When false the pattern is a
    /// prefix match ending at a `/` or the end of the path.
    pub end: bool,
}

impl Default for PatternOptions {
    fn default() -> Self {
        Self {
            sensitive: false,
            strict: false,
            end: true,
        }
    }
}

/// The result of a successful match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathMatch {
    /// The part of the path consumed by the pattern.
    pub path: String,
    /// Decoded parameters, in declaration order.
    pub params: Params,
}

#[derive(Debug, Clone)]
enum Matcher {
    /// `/` with `end: false`: every path matches, nothing is consumed.
    Slash,
    /// `*`: every path matches and is captured whole.
    Star,
    Regex(Regex),
}

/// A compiled path pattern.
/// ```rust
/// use junction::pattern::{Pattern, PatternOptions};
///
/// let pattern = Pattern::compile("/user/:id", PatternOptions::default()).unwrap();
/// let found = pattern.matches("/user/42").unwrap().unwrap();
/// assert_eq!(found.params.get("id"), Some("42"));
/// assert_eq!(found.path, "/user/42");
/// ```
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    matcher: Matcher,
    // (key, regex group name)
    keys: Vec<(ParamKey, String)>,
}

impl Pattern {
    /// Compiles `path` into a pattern.
    pub fn compile(path: &str, options: PatternOptions) -> std::result::Result<Self, regex::Error> {
        if path == "/" && !options.end {
            return Ok(Self {
                source: path.to_owned(),
                matcher: Matcher::Slash,
                keys: Vec::new(),
            });
        }

        if path == "*" {
            return Ok(Self {
                source: path.to_owned(),
                matcher: Matcher::Star,
                keys: vec![(ParamKey::Index(0), String::new())],
            });
        }

        let (expr, keys) = Compiler::new(path, options).compile();
        let regex = RegexBuilder::new(&expr)
            .case_insensitive(!options.sensitive)
            .build()?;

        Ok(Self {
            source: path.to_owned(),
            matcher: Matcher::Regex(regex),
            keys,
        })
    }

    /// The pattern string this was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Parameter keys, in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &ParamKey> {
        self.keys.iter().map(|(key, _)| key)
    }

    /// Matches `path`, returning `Ok(None)` on a miss. Captured values are
    /// percent-decoded; a value that cannot be decoded is an error.
    pub fn matches(&self, path: &str) -> Result<Option<PathMatch>> {
        let regex = match &self.matcher {
            Matcher::Slash => return Ok(Some(PathMatch::default())),
            Matcher::Star => {
                let mut params = Params::default();
                params.insert(ParamKey::Index(0), decode_param(path)?);
                return Ok(Some(PathMatch {
                    path: path.to_owned(),
                    params,
                }));
            }
            Matcher::Regex(regex) => regex,
        };

        let captures = match regex.captures(path) {
            Some(captures) => captures,
            None => return Ok(None),
        };

        let mut params = Params::default();
        for (key, group) in &self.keys {
            if let Some(value) = captures.name(group) {
                params.insert(key.clone(), decode_param(value.as_str())?);
            }
        }

        let whole = captures.get(0).map_or(0..0, |m| m.range());
        let end = captures.name(BOUNDARY).map_or(whole.end, |m| m.start());
        Ok(Some(PathMatch {
            path: path[whole.start..end].to_owned(),
            params,
        }))
    }
}

/// Percent-decodes a captured value the way `decodeURIComponent` does: every
/// `%` must start a valid escape and the result must be UTF-8.
pub(crate) fn decode_param(value: &str) -> Result<Cow<'_, str>> {
    if value.is_empty() {
        return Ok(Cow::Borrowed(value));
    }

    let invalid = || Error::Decode {
        value: value.to_owned(),
    };

    let bytes = value.as_bytes();
    for (i, byte) in bytes.iter().enumerate() {
        if *byte == b'%' {
            let escape = bytes.get(i + 1..i + 3).ok_or_else(invalid)?;
            if !escape.iter().all(u8::is_ascii_hexdigit) {
                return Err(invalid());
            }
        }
    }

    percent_decode_str(value).decode_utf8().map_err(|_| invalid())
}

// Name of the group standing in for a `(?=/|$)` lookahead, which the regex
// crate does not support. It is excluded from the consumed path.
const BOUNDARY: &str = "boundary";

struct Compiler {
    chars: Vec<char>,
    options: PatternOptions,
    expr: String,
    keys: Vec<(ParamKey, String)>,
    positional: usize,
}

struct Placeholder {
    slash: bool,
    format: bool,
    name: String,
    capture: Option<String>,
    star: bool,
    optional: bool,
    end: usize,
}

impl Compiler {
    fn new(path: &str, options: PatternOptions) -> Self {
        let mut chars: Vec<char> = path.chars().collect();
        if !options.strict {
            if !path.ends_with('/') {
                chars.push('/');
            }
            chars.push('?');
        }

        Self {
            chars,
            options,
            expr: String::from("^"),
            keys: Vec::new(),
            positional: 0,
        }
    }

    fn group(&mut self, key: ParamKey) -> String {
        let group = format!("p{}", self.keys.len());
        self.keys.push((key, group.clone()));
        group
    }

    fn positional_group(&mut self) -> String {
        let key = ParamKey::Index(self.positional);
        self.positional += 1;
        self.group(key)
    }

    fn compile(mut self) -> (String, Vec<(ParamKey, String)>) {
        let mut i = 0;
        while i < self.chars.len() {
            if let Some(placeholder) = self.placeholder(i) {
                i = placeholder.end;
                self.push_placeholder(placeholder);
                continue;
            }

            let c = self.chars[i];
            match c {
                '*' => {
                    let group = self.positional_group();
                    self.expr.push_str(&format!("(?P<{}>.*)", group));
                }
                '(' => {
                    if i > 0 && self.chars[i - 1] == '/' {
                        self.expr.push_str("(?:");
                    } else if self.chars.get(i + 1) == Some(&'?') {
                        self.expr.push('(');
                    } else {
                        let group = self.positional_group();
                        self.expr.push_str(&format!("(?P<{}>", group));
                    }
                }
                ')' | '?' | '+' => self.expr.push(c),
                _ => self.expr.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
            }
            i += 1;
        }

        if self.options.end {
            self.expr.push('$');
        } else if !self.expr.ends_with('/') {
            self.expr.push_str(&format!("(?P<{}>/|$)", BOUNDARY));
        }

        (self.expr, self.keys)
    }

    /// Parses `[/][.]:name[(re)][*][?]` starting at `start`.
    fn placeholder(&self, start: usize) -> Option<Placeholder> {
        let chars = &self.chars;
        let mut i = start;

        let slash = chars.get(i) == Some(&'/');
        if slash {
            i += 1;
        }
        let format = chars.get(i) == Some(&'.');
        if format {
            i += 1;
        }
        if chars.get(i) != Some(&':') {
            return None;
        }
        i += 1;

        let name_start = i;
        while chars.get(i).map_or(false, |c| c.is_ascii_alphanumeric() || *c == '_') {
            i += 1;
        }
        if i == name_start {
            return None;
        }
        let name: String = chars[name_start..i].iter().collect();

        let mut capture = None;
        if chars.get(i) == Some(&'(') {
            let mut depth = 0;
            let mut j = i;
            while j < chars.len() {
                match chars[j] {
                    '\\' => j += 1,
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
                j += 1;
            }
            if j < chars.len() {
                capture = Some(chars[i + 1..j].iter().collect());
                i = j + 1;
            }
        }

        let star = chars.get(i) == Some(&'*');
        if star {
            i += 1;
        }
        let optional = chars.get(i) == Some(&'?');
        if optional {
            i += 1;
        }

        Some(Placeholder {
            slash,
            format,
            name,
            capture,
            star,
            optional,
            end: i,
        })
    }

    fn push_placeholder(&mut self, p: Placeholder) {
        let slash = if p.slash { "/" } else { "" };
        let format = if p.format { "\\." } else { "" };

        let group = self.group(ParamKey::Name(p.name));
        let capture = match p.capture {
            Some(custom) => format!("(?P<{}>{})", group, custom),
            None => format!("(?P<{}>[^/{}]+?)", group, if p.format { "." } else { "" }),
        };

        if !p.optional {
            self.expr.push_str(slash);
        }
        self.expr.push_str("(?:");
        self.expr.push_str(format);
        if p.optional {
            self.expr.push_str(slash);
        }
        self.expr.push_str(&capture);
        if p.star {
            let rest = self.positional_group();
            self.expr.push_str(&format!(
                "(?P<{}>(?:[/{}].+?)?)",
                rest,
                if p.format { "." } else { "" }
            ));
        }
        self.expr.push(')');
        if p.optional {
            self.expr.push('?');
        }
    }
}
