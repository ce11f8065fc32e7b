//! POSIX permission evaluation for namespace entries.

use crate::model::{FileAttributes, Subject};

const OWNER_READ: u32 = 0o400;
const OWNER_EXEC: u32 = 0o100;
const GROUP_READ: u32 = 0o040;
const GROUP_EXEC: u32 = 0o010;
const OTHER_READ: u32 = 0o004;
const OTHER_EXEC: u32 = 0o001;

/// Whether `subject` may read the entry's content.
///
/// Entries without mode or ownership information are treated as already
/// filtered by the namespace and therefore readable.
#[must_use]
pub fn can_read(subject: &Subject, attributes: &FileAttributes) -> bool {
    allowed(subject, attributes, (OWNER_READ, GROUP_READ, OTHER_READ))
}

/// Whether `subject` may enumerate a directory (read and search bits).
#[must_use]
pub fn can_list(subject: &Subject, attributes: &FileAttributes) -> bool {
    allowed(
        subject,
        attributes,
        (
            OWNER_READ | OWNER_EXEC,
            GROUP_READ | GROUP_EXEC,
            OTHER_READ | OTHER_EXEC,
        ),
    )
}

fn allowed(subject: &Subject, attributes: &FileAttributes, bits: (u32, u32, u32)) -> bool {
    if subject.is_root() {
        return true;
    }
    let (Some(mode), Some(owner)) = (attributes.mode, attributes.owner) else {
        return true;
    };
    let (owner_bits, group_bits, other_bits) = bits;
    let required = if owner == subject.uid {
        owner_bits
    } else if attributes.group.is_some_and(|gid| subject.in_group(gid)) {
        group_bits
    } else {
        other_bits
    };
    mode & required == required
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Subject {
        Subject::new(1000, vec![100])
    }

    #[test]
    fn owner_group_and_other_bits_are_selected() {
        let owned = FileAttributes::regular(1).with_mode(0o600).with_owner(1000, 5);
        assert!(can_read(&alice(), &owned));

        let group = FileAttributes::regular(1).with_mode(0o040).with_owner(1, 100);
        assert!(can_read(&alice(), &group));

        let other = FileAttributes::regular(1).with_mode(0o640).with_owner(1, 5);
        assert!(!can_read(&alice(), &other));

        let owner_without_read = FileAttributes::regular(1).with_mode(0o044).with_owner(1000, 100);
        assert!(!can_read(&alice(), &owner_without_read));
    }

    #[test]
    fn listing_requires_search_bit() {
        let readable_only = FileAttributes::directory().with_mode(0o444).with_owner(1, 5);
        assert!(!can_list(&alice(), &readable_only));
        let searchable = FileAttributes::directory().with_mode(0o755).with_owner(1, 5);
        assert!(can_list(&alice(), &searchable));
    }

    #[test]
    fn root_and_unknown_metadata_are_allowed() {
        let locked = FileAttributes::regular(1).with_mode(0o000).with_owner(1, 1);
        assert!(can_read(&Subject::root(), &locked));
        assert!(can_read(&alice(), &FileAttributes::regular(1)));
    }
}
