//! Entity resolution: mapping a free-text question onto one roster member.
//!
//! Resolution is alias-based. The question is normalized (case-folded,
//! punctuation stripped) and each member's aliases are tested as token
//! sequences against it. The longest matching alias wins; ties go to the
//! member listed first in the roster. Questions naming multiple members
//! resolve to that single winner; multi-person questions are a documented
//! limitation, not something resolution tries to repair.

use crate::models::Member;

/// The fixed member roster with precomputed, normalized aliases.
pub struct Roster {
    members: Vec<Member>,
    /// Per member: normalized alias strings, as derived at construction.
    normalized_aliases: Vec<Vec<String>>,
}

impl Roster {
    /// Build a roster from config members, filling default aliases
    /// (full/first/last name) where none are listed.
    pub fn new(members: Vec<Member>) -> Self {
        let members: Vec<Member> = members
            .into_iter()
            .map(Member::with_default_aliases)
            .collect();
        let normalized_aliases = members
            .iter()
            .map(|m| {
                m.aliases
                    .iter()
                    .map(|a| normalize(a))
                    .filter(|a| !a.is_empty())
                    .collect()
            })
            .collect();
        Self {
            members,
            normalized_aliases,
        }
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Resolve a question to a member, or `None` when no alias matches.
    ///
    /// Never fails: an unresolvable question is an expected outcome the
    /// caller short-circuits on, not an error.
    pub fn resolve(&self, question: &str) -> Option<&Member> {
        let normalized = normalize(question);
        if normalized.is_empty() {
            return None;
        }
        let haystack = format!(" {} ", normalized);

        let mut best: Option<(usize, usize)> = None; // (alias_len, member_idx)
        for (idx, aliases) in self.normalized_aliases.iter().enumerate() {
            for alias in aliases {
                // Token-boundary match: the normalized alias surrounded by
                // spaces inside the padded question. Possessives survive
                // normalization ("layla's" -> "layla s").
                let needle = format!(" {} ", alias);
                if haystack.contains(&needle) {
                    let longer = match best {
                        Some((len, _)) => alias.len() > len,
                        None => true,
                    };
                    if longer {
                        best = Some((alias.len(), idx));
                    }
                }
            }
        }

        best.map(|(_, idx)| &self.members[idx])
    }
}

/// Case-fold and strip punctuation, collapsing runs of separators into
/// single spaces.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = true;
    for c in text.chars() {
        if c.is_alphanumeric() {
            for lower in c.to_lowercase() {
                out.push(lower);
            }
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}
