//! Free-text light commands
//!
//! A command is a list of `key:value` (or `key=value`) pairs separated by
//! commas or semicolons, for example `r:255, g:0, b:0, x:20` or
//! `#ff8000;x10`. Recognised keys:
//!
//! | Key | Alias | Meaning |
//! |---|---|---|
//! | `r` `g` `b` `w` | `red` `green` `blue` `white` | channel value 0..255 |
//! | `#rrggbb[ww][.f]` | `h` | hex color, optional fraction |
//! | `x` | `transition` | transition in tenths of a second |
//! | `l` | `bri` | brightness in percent |
//! | `ct` | | color temperature, 0..5000 scale |
//! | `on` | | power on (`on`, `on:1`) or off (`on:0`) |
//! | `off` | | fade to black |
//! | `p` | `program` | looping program, `[{r,g,b,x}, ...]` |

use std::str::FromStr;

use serde::Deserialize;

use crate::color::{parse_hex_color, Rgbw};
use crate::error::ParseError;

/// One step of a looping color program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct ProgramStep {
    #[serde(default, alias = "red")]
    pub r: Option<u8>,
    #[serde(default, alias = "green")]
    pub g: Option<u8>,
    #[serde(default, alias = "blue")]
    pub b: Option<u8>,
    #[serde(default, alias = "white")]
    pub w: Option<u8>,
    /// Transition in tenths of a second. Negative ends the program after
    /// this step.
    #[serde(default, alias = "transition")]
    pub x: i32,
}

impl ProgramStep {
    /// Target color, present when the step names a red value
    pub fn color(&self) -> Option<Rgbw> {
        self.r.map(|r| Rgbw {
            red: r,
            green: self.g.unwrap_or(0),
            blue: self.b.unwrap_or(0),
            white: self.w,
        })
    }

    pub fn transition(&self) -> u32 {
        self.x.unsigned_abs()
    }

    pub fn ends_program(&self) -> bool {
        self.x < 0
    }
}

/// A parsed free-text command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LightCommand {
    pub red: Option<u8>,
    pub green: Option<u8>,
    pub blue: Option<u8>,
    pub white: Option<u8>,
    pub transition: Option<u32>,
    pub brightness: Option<u8>,
    pub ct: Option<u32>,
    pub on: Option<bool>,
    pub off: bool,
    pub program: Option<Vec<ProgramStep>>,
}

impl LightCommand {
    pub fn has_color(&self) -> bool {
        self.red.is_some() || self.green.is_some() || self.blue.is_some() || self.white.is_some()
    }

    /// Overlay the given channels on `current`
    pub fn color_over(&self, current: Rgbw) -> Rgbw {
        Rgbw {
            red: self.red.unwrap_or(current.red),
            green: self.green.unwrap_or(current.green),
            blue: self.blue.unwrap_or(current.blue),
            white: self.white.or(current.white),
        }
    }

    fn set_hex(&mut self, value: &str) -> Result<(), ParseError> {
        let color = parse_hex_color(value)?;
        self.red = Some(color.red);
        self.green = Some(color.green);
        self.blue = Some(color.blue);
        if color.white.is_some() {
            self.white = color.white;
        }
        Ok(())
    }
}

impl FromStr for LightCommand {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s
            .strip_prefix('{')
            .and_then(|inner| inner.strip_suffix('}'))
            .unwrap_or(s);

        let mut cmd = LightCommand::default();
        let mut any = false;
        for part in split_top_level(s) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            any = true;

            if part.starts_with('#') {
                cmd.set_hex(part)?;
                continue;
            }

            // `key:value`, `key=value`, or the short form `x10`
            let (key, value) = match part.find([':', '=']) {
                Some(idx) => (&part[..idx], &part[idx + 1..]),
                None => part.split_at(
                    part.find(|c: char| !c.is_ascii_alphabetic())
                        .unwrap_or(part.len()),
                ),
            };
            let key = key.trim().trim_matches('"').to_ascii_lowercase();
            let value = value.trim().trim_matches('"');
            let invalid = || ParseError::InvalidValue {
                key: key.clone(),
                value: value.to_string(),
            };

            match key.as_str() {
                "r" | "red" => cmd.red = Some(channel(value).ok_or_else(invalid)?),
                "g" | "green" => cmd.green = Some(channel(value).ok_or_else(invalid)?),
                "b" | "blue" => cmd.blue = Some(channel(value).ok_or_else(invalid)?),
                "w" | "white" => cmd.white = Some(channel(value).ok_or_else(invalid)?),
                "h" => cmd.set_hex(value)?,
                "x" | "transition" => cmd.transition = Some(value.parse().map_err(|_| invalid())?),
                "l" | "bri" | "brightness" => {
                    let v: u32 = value.parse().map_err(|_| invalid())?;
                    cmd.brightness = Some(v.min(100) as u8);
                }
                "ct" => cmd.ct = Some(value.parse().map_err(|_| invalid())?),
                "on" if value.is_empty() => cmd.on = Some(true),
                "on" => cmd.on = Some(flag(value).ok_or_else(invalid)?),
                "off" if value.is_empty() => cmd.off = true,
                "off" => cmd.off = flag(value).ok_or_else(invalid)?,
                "p" | "program" => cmd.program = Some(parse_program(value)?),
                _ => return Err(ParseError::UnknownKey(key.clone())),
            }
        }

        if !any {
            return Err(ParseError::Empty);
        }
        Ok(cmd)
    }
}

/// Channel value, clamped into 0..=255
fn channel(value: &str) -> Option<u8> {
    value.parse::<i64>().ok().map(|v| v.clamp(0, 255) as u8)
}

fn flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

/// Split on `,` and `;` outside of brackets and braces
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '[' | '{' => depth += 1,
            ']' | '}' => depth -= 1,
            ',' | ';' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Parse `[{r:255,g:0,b:0,x:10}, ...]`; keys may be unquoted
pub fn parse_program(value: &str) -> Result<Vec<ProgramStep>, ParseError> {
    let json = quote_keys(value);
    serde_json::from_str(&json).map_err(|e| ParseError::Program(e.to_string()))
}

/// Wrap bare identifiers followed by `:` in double quotes
fn quote_keys(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 16);
    let mut chars = s.char_indices().peekable();
    let mut in_string = false;
    while let Some((i, c)) = chars.next() {
        if c == '"' {
            in_string = !in_string;
            out.push(c);
            continue;
        }
        if in_string || !c.is_ascii_alphabetic() {
            out.push(c);
            continue;
        }

        let mut end = i + c.len_utf8();
        while let Some(&(j, n)) = chars.peek() {
            if !n.is_ascii_alphanumeric() {
                break;
            }
            end = j + n.len_utf8();
            chars.next();
        }
        let word = &s[i..end];
        let is_key = s[end..].trim_start().starts_with(':');
        if is_key {
            out.push('"');
            out.push_str(word);
            out.push('"');
        } else {
            out.push_str(word);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_and_transition() {
        let cmd: LightCommand = "r:255, g=10; blue:3, x:20".parse().unwrap();
        assert_eq!(cmd.red, Some(255));
        assert_eq!(cmd.green, Some(10));
        assert_eq!(cmd.blue, Some(3));
        assert_eq!(cmd.transition, Some(20));
        assert!(cmd.has_color());
    }

    #[test]
    fn test_hex_and_transition() {
        let cmd: LightCommand = "#00000000;x10".parse().unwrap();
        assert_eq!(cmd.color_over(Rgbw::rgb(9, 9, 9)), Rgbw::rgbw(0, 0, 0, 0));
        assert_eq!(cmd.transition, Some(10));
    }

    #[test]
    fn test_bare_words() {
        let cmd: LightCommand = "on".parse().unwrap();
        assert_eq!(cmd.on, Some(true));
        let cmd: LightCommand = "off, x:5".parse().unwrap();
        assert!(cmd.off);
        let cmd: LightCommand = "on:0".parse().unwrap();
        assert_eq!(cmd.on, Some(false));
        let cmd: LightCommand = "l50;x5".parse().unwrap();
        assert_eq!(cmd.brightness, Some(50));
        assert_eq!(cmd.transition, Some(5));
    }

    #[test]
    fn test_braces_and_quotes() {
        let cmd: LightCommand = r#"{"r":1,"g":2,"b":3,"on":true}"#.parse().unwrap();
        assert_eq!((cmd.red, cmd.green, cmd.blue), (Some(1), Some(2), Some(3)));
        assert_eq!(cmd.on, Some(true));
    }

    #[test]
    fn test_brightness_and_ct() {
        let cmd: LightCommand = "bri:150, ct:2500".parse().unwrap();
        assert_eq!(cmd.brightness, Some(100));
        assert_eq!(cmd.ct, Some(2500));
        assert!(!cmd.has_color());
    }

    #[test]
    fn test_program() {
        let cmd: LightCommand = "p:[{r:255,g:0,b:0,x:10},{r:0,g:0,b:255,x:-10}]".parse().unwrap();
        let program = cmd.program.unwrap();
        assert_eq!(program.len(), 2);
        assert_eq!(program[0].color(), Some(Rgbw::rgb(255, 0, 0)));
        assert_eq!(program[0].transition(), 10);
        assert!(!program[0].ends_program());
        assert!(program[1].ends_program());
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!("".parse::<LightCommand>(), Err(ParseError::Empty));
        assert!(matches!(
            "foo:1".parse::<LightCommand>(),
            Err(ParseError::UnknownKey(_))
        ));
        assert!(matches!(
            "r:abc".parse::<LightCommand>(),
            Err(ParseError::InvalidValue { .. })
        ));
        assert!(matches!(
            "p:[{r:1".parse::<LightCommand>(),
            Err(ParseError::Program(_))
        ));
        assert!(matches!(
            "#12".parse::<LightCommand>(),
            Err(ParseError::HexColor(_))
        ));
    }

    #[test]
    fn test_quote_keys() {
        assert_eq!(quote_keys("[{r:1, x : -2}]"), r#"[{"r":1, "x" : -2}]"#);
        assert_eq!(quote_keys(r#"[{"r":1}]"#), r#"[{"r":1}]"#);
    }
}
