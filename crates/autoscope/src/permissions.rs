use autoscope_core::{
    stmt::{nest_ors, Formula},
    Error,
};
use std::str::FromStr;

/// The actions one principal class may perform on a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Permissions {
    pub read: bool,
    pub update: bool,
    pub insert: bool,
}

/// Owner/group/everyone permission triple for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectPermissions {
    pub owner: Permissions,
    pub group: Permissions,
    pub everyone: Permissions,
}

impl Default for ObjectPermissions {
    fn default() -> Self {
        Self {
            owner: Permissions {
                read: true,
                update: true,
                insert: true,
            },
            group: Permissions {
                read: true,
                update: false,
                insert: true,
            },
            everyone: Permissions::default(),
        }
    }
}

impl FromStr for Permissions {
    type Err = Error;

    /// Parses a comma-separated grant list, e.g. `"read, write"`. `write`
    /// expands to insert plus update; `none` grants nothing.
    fn from_str(s: &str) -> Result<Self, Error> {
        let mut p = Permissions::default();
        for part in s.to_lowercase().replace(' ', "").split(',') {
            match part {
                "read" => p.read = true,
                "insert" => p.insert = true,
                "update" => p.update = true,
                "write" => {
                    p.insert = true;
                    p.update = true;
                }
                "none" | "" => {}
                other => {
                    return Err(Error::invalid_config(format!(
                        "invalid permission value: {other}"
                    )))
                }
            }
        }
        Ok(p)
    }
}

pub(crate) fn read_action(p: &Permissions) -> bool {
    p.read
}

pub(crate) fn update_action(p: &Permissions) -> bool {
    p.update
}

/// Rewrites a SELECT or UPDATE selection so the backend only touches rows
/// the user may act on. Returns `None` when the action is denied outright;
/// callers turn that into an empty result rather than an error.
pub(crate) fn apply_to_selection(
    selection: Formula,
    permissions: &ObjectPermissions,
    user_id: i64,
    groups: &[i64],
    action: fn(&Permissions) -> bool,
) -> Option<Formula> {
    // Everyone may act: nothing to restrict.
    if action(&permissions.everyone) {
        return Some(selection);
    }

    if !action(&permissions.owner) && !action(&permissions.group) {
        return None;
    }

    let mut perm_formula = None;
    if action(&permissions.group) && !groups.is_empty() {
        let grants = groups
            .iter()
            .map(|gid| Formula::eq("autoscope_gid", *gid))
            .collect();
        perm_formula = Some(nest_ors(grants));
    }
    if action(&permissions.owner) {
        let owner = Formula::eq("autoscope_uid", user_id);
        perm_formula = Some(match perm_formula {
            Some(f) => Formula::or(f, owner),
            None => owner,
        });
    }

    // E.g. only group members may act and the user is in no groups.
    let perm_formula = perm_formula?;
    Some(Formula::and(selection, perm_formula))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn everyone_grant_leaves_selection_untouched() {
        let perms = ObjectPermissions {
            everyone: Permissions {
                read: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let rewritten = apply_to_selection(Formula::Tautology, &perms, 1, &[], read_action);
        assert_eq!(rewritten, Some(Formula::Tautology));
    }

    #[test]
    fn no_grants_denies() {
        let perms = ObjectPermissions {
            owner: Permissions::default(),
            group: Permissions::default(),
            everyone: Permissions::default(),
        };
        assert_eq!(
            apply_to_selection(Formula::Tautology, &perms, 1, &[7], read_action),
            None
        );
    }

    #[test]
    fn group_only_with_no_memberships_denies() {
        let perms = ObjectPermissions {
            owner: Permissions::default(),
            group: Permissions {
                read: true,
                ..Default::default()
            },
            everyone: Permissions::default(),
        };
        assert_eq!(
            apply_to_selection(Formula::Tautology, &perms, 1, &[], read_action),
            None
        );
    }

    #[test]
    fn owner_and_groups_compose_with_or() {
        let perms = ObjectPermissions::default();
        let rewritten =
            apply_to_selection(Formula::eq("x", 1), &perms, 9, &[3, 4], read_action).unwrap();
        assert_eq!(
            rewritten,
            Formula::and(
                Formula::eq("x", 1),
                Formula::or(
                    Formula::or(Formula::eq("autoscope_gid", 3), Formula::eq("autoscope_gid", 4)),
                    Formula::eq("autoscope_uid", 9),
                ),
            )
        );
    }

    #[test]
    fn parse_grant_lists() {
        let p: Permissions = "read, write".parse().unwrap();
        assert!(p.read && p.update && p.insert);

        let p: Permissions = "none".parse().unwrap();
        assert_eq!(p, Permissions::default());

        assert!("read, fly".parse::<Permissions>().is_err());
    }
}
