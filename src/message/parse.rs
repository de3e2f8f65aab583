//! Identifier, size and string helpers used during normalization

use crate::transport::FileLength;

/// Server part used for individual accounts
const USER_SERVER: &str = "s.whatsapp.net";

/// Legacy server alias normalized to [`USER_SERVER`]
const LEGACY_USER_SERVER: &str = "c.us";

/// Server part of group identifiers
pub const GROUP_SERVER: &str = "g.us";

/// Normalize an identifier to `user@server`, stripping any device suffix
///
/// `123:4@s.whatsapp.net` and `123@c.us` both become `123@s.whatsapp.net`.
/// Strings without a server part are returned unchanged.
#[must_use]
pub fn normalize_jid(jid: &str) -> String {
    let Some((user, server)) = jid.split_once('@') else {
        return jid.to_string();
    };

    let user = user.split_once(':').map_or(user, |(user, _device)| user);
    let server = if server == LEGACY_USER_SERVER {
        USER_SERVER
    } else {
        server
    };

    format!("{user}@{server}")
}

/// Whether a normalized identifier names a group chat
#[must_use]
pub fn is_group_jid(jid: &str) -> bool {
    jid.contains(&format!("@{GROUP_SERVER}"))
}

/// International phone form (`+<digits>`) of an identifier's user part
///
/// Returns an empty string when the user part carries no digits.
#[must_use]
pub fn phone_number(jid: &str) -> String {
    let user = jid.split('@').next().unwrap_or_default();
    let user = user.split(':').next().unwrap_or_default();
    let digits: String = user.chars().filter(char::is_ascii_digit).collect();

    if digits.is_empty() {
        String::new()
    } else {
        format!("+{digits}")
    }
}

/// Strip line breaks and tabs from a display name
#[must_use]
pub fn safe_string(text: Option<&str>) -> String {
    text.map(|t| t.replace(['\n', '\t', '\r'], ""))
        .unwrap_or_default()
}

/// Byte size from the transport's size field
///
/// Returns `None` for an absent, negative or unparseable size.
#[must_use]
pub fn calculate_size(size: Option<&FileLength>) -> Option<u64> {
    match size? {
        FileLength::Number(n) => Some(*n),
        FileLength::Long {
            low,
            high,
            unsigned,
        } => {
            #[allow(clippy::cast_sign_loss)]
            let bits = (u64::from(*high as u32) << 32) | u64::from(*low as u32);
            if *unsigned {
                Some(bits)
            } else {
                #[allow(clippy::cast_possible_wrap)]
                u64::try_from(bits as i64).ok()
            }
        }
        FileLength::Text(s) => s.trim().parse().ok(),
    }
}

/// Split text into arguments on single spaces
///
/// Empty text yields a single empty argument.
#[must_use]
pub fn split_args(text: &str) -> Vec<String> {
    text.split(' ').map(String::from).collect()
}
