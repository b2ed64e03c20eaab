//! Naming rules and identifiers used by the in-process engine.

const UUID_ALPHABET: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const UUID_GROUPS: [usize; 7] = [6, 4, 4, 4, 4, 4, 6];

const NAME_MAX: usize = 127;
const TAG_MAX: usize = 1024;
const LV_RESERVED_PREFIXES: &[&str] = &["snapshot", "pvmove"];

pub(super) fn check_vg_name(name: &str) -> Result<(), String> {
    check_name("volume group", name)
}

pub(super) fn check_lv_name(name: &str) -> Result<(), String> {
    check_name("logical volume", name)?;
    if let Some(p) = LV_RESERVED_PREFIXES.iter().find(|p| name.starts_with(**p)) {
        return Err(format!("Names starting \"{p}\" are reserved: \"{name}\""));
    }
    Ok(())
}

fn check_name(what: &str, name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err(format!("Empty {what} name"));
    }
    if name.len() > NAME_MAX {
        return Err(format!("Name too long for {what}: \"{name}\""));
    }
    if name == "." || name == ".." || name.starts_with('-') {
        return Err(format!("Invalid {what} name \"{name}\""));
    }
    let ok = name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'_' | b'.' | b'-'));
    if !ok {
        return Err(format!("Invalid characters in {what} name \"{name}\""));
    }
    Ok(())
}

pub(super) fn check_tag(tag: &str) -> Result<(), String> {
    let ok = (1..=TAG_MAX).contains(&tag.len())
        && !tag.starts_with('-')
        && tag.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'_' | b'+' | b'.' | b'-' | b'/' | b'=' | b'!' | b':' | b'&' | b'#'
                )
        });
    if ok {
        Ok(())
    } else {
        Err(format!("Invalid tag \"{tag}\""))
    }
}

/// A fresh identifier in LVM's 6-4-4-4-4-4-6 layout.
pub(super) fn new_uuid() -> String {
    let mut raw = [0u8; 32];
    raw[..16].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
    raw[16..].copy_from_slice(uuid::Uuid::new_v4().as_bytes());

    let chars: Vec<char> = raw
        .iter()
        .map(|b| UUID_ALPHABET[usize::from(*b) % UUID_ALPHABET.len()] as char)
        .collect();

    let mut out = String::with_capacity(38);
    let mut at = 0;
    for (i, len) in UUID_GROUPS.into_iter().enumerate() {
        if i > 0 {
            out.push('-');
        }
        out.extend(&chars[at..at + len]);
        at += len;
    }
    out
}

/// PV ids are passed around without separators.
#[inline]
pub(super) fn bare_uuid(s: &str) -> String {
    s.chars().filter(|c| *c != '-').collect()
}

/// Brackets and braces of an lvm.conf fragment must pair up outside of quotes.
pub(super) fn config_text_balanced(text: &str) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    let mut stack = Vec::new();
    let mut quoted = false;
    let mut escaped = false;
    for c in text.chars() {
        if quoted {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => quoted = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => quoted = true,
            '{' | '[' => stack.push(c),
            '}' | ']' => {
                let open = if c == '}' { '{' } else { '[' };
                if stack.pop() != Some(open) {
                    return false;
                }
            }
            _ => {}
        }
    }
    !quoted && stack.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vg_names() {
        assert!(check_vg_name("vg0").is_ok());
        assert!(check_vg_name("my.vg+_-x").is_ok());
        assert!(check_vg_name("").is_err());
        assert!(check_vg_name("..").is_err());
        assert!(check_vg_name("-vg").is_err());
        assert!(check_vg_name("vg/0").is_err());
        assert!(check_vg_name(&"a".repeat(128)).is_err());
    }

    #[test]
    fn lv_reserved_prefix() {
        assert!(check_lv_name("data").is_ok());
        assert!(check_lv_name("snapshot0").is_err());
        assert!(check_lv_name("pvmove1").is_err());
    }

    #[test]
    fn tags() {
        assert!(check_tag("backup").is_ok());
        assert!(check_tag("@site=a/b:c&d#e!").is_err());
        assert!(check_tag("site=a/b:c&d#e!").is_ok());
        assert!(check_tag("with space").is_err());
        assert!(check_tag("").is_err());
        assert!(check_tag("-lead").is_err());
    }

    #[test]
    fn uuid_layout() {
        let u = new_uuid();
        let groups: Vec<usize> = u.split('-').map(str::len).collect();
        assert_eq!(groups, UUID_GROUPS.to_vec());
        assert!(bare_uuid(&u).bytes().all(|b| b.is_ascii_alphanumeric()));
        assert_ne!(u, new_uuid());
    }

    #[test]
    fn config_balance() {
        assert!(config_text_balanced(r#"devices { filter = [ "a|.*|" ] }"#));
        assert!(config_text_balanced(r#"global { x = "}{" }"#));
        assert!(!config_text_balanced("devices { filter"));
        assert!(!config_text_balanced("devices ] {"));
        assert!(!config_text_balanced("  "));
    }
}
