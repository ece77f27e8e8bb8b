use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Longest line a client chat window displays
pub const CHAT_LINE_WIDTH: usize = 119;

/// Longest player name accepted at login
pub const MAX_NAME_LEN: usize = 16;

// Get current timestamp in milliseconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// Player names are 1-16 ASCII letters, digits or underscores
pub fn is_valid_player_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Splits chat text into lines no wider than `width` characters
///
/// Explicit newlines always start a new line. Lines break at spaces where
/// possible; words longer than a full line are cut.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut line = String::new();
        let mut line_len = 0;

        for word in paragraph.split(' ') {
            let mut chars: Vec<char> = word.chars().collect();
            let separator = usize::from(line_len > 0);

            if line_len + separator + chars.len() <= width {
                if separator == 1 {
                    line.push(' ');
                }
                line.extend(chars.iter());
                line_len += separator + chars.len();
                continue;
            }

            if line_len > 0 {
                lines.push(std::mem::take(&mut line));
            }

            while chars.len() > width {
                lines.push(chars.drain(..width).collect());
            }
            line = chars.iter().collect();
            line_len = chars.len();
        }

        lines.push(line);
    }

    lines
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatFormatError {
    #[error("format references argument {0} but only 2 are available")]
    MissingArgument(usize),
    #[error("unsupported conversion '%{0}'")]
    UnknownConversion(char),
    #[error("format ends in the middle of a conversion")]
    Truncated,
    #[error("argument index is too large")]
    IndexOverflow,
}

/// Renders a chat format with the sender's display name and the message
///
/// Supports `%s` (next argument), `%1$s`/`%2$s` (explicit argument), `%n`
/// and `%%`.
pub fn format_chat(format: &str, display_name: &str, message: &str) -> Result<String, ChatFormatError> {
    let args = [display_name, message];
    let mut out = String::with_capacity(format.len() + display_name.len() + message.len());
    let mut next_arg = 0;
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        match chars.next().ok_or(ChatFormatError::Truncated)? {
            '%' => out.push('%'),
            'n' => out.push('\n'),
            's' => {
                let arg = args
                    .get(next_arg)
                    .ok_or(ChatFormatError::MissingArgument(next_arg + 1))?;
                out.push_str(arg);
                next_arg += 1;
            }
            digit @ '1'..='9' => {
                let mut index = digit.to_digit(10).unwrap_or(0) as usize;
                while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                    index = index
                        .checked_mul(10)
                        .and_then(|i| i.checked_add(d as usize))
                        .ok_or(ChatFormatError::IndexOverflow)?;
                    chars.next();
                }
                match (chars.next(), chars.next()) {
                    (Some('$'), Some('s')) => {}
                    (Some('$'), Some(other)) => return Err(ChatFormatError::UnknownConversion(other)),
                    (Some(other), _) => return Err(ChatFormatError::UnknownConversion(other)),
                    _ => return Err(ChatFormatError::Truncated),
                }
                let arg = args
                    .get(index - 1)
                    .ok_or(ChatFormatError::MissingArgument(index))?;
                out.push_str(arg);
            }
            other => return Err(ChatFormatError::UnknownConversion(other)),
        }
    }

    Ok(out)
}
