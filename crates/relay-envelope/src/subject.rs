use std::fmt;

const MAX_SUBJECT_LEN: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum SubjectError {
    #[error("subject exceeds {MAX_SUBJECT_LEN} characters: {0}")]
    TooLong(String),
    #[error("subject has an empty token: {0}")]
    EmptyToken(String),
    #[error("subject token '>' may only appear as the final token: {0}")]
    WildcardNotFinal(String),
    #[error("subject token contains characters outside [A-Za-z0-9_-]: {0}")]
    InvalidToken(String),
}

/// An immutable, normalized dotted subject: `env.app.<topic-or-d.r.a>`.
///
/// Two subjects built from the same string are equal; `Subject` derives
/// `PartialEq`/`Eq`/`Hash` off the wrapped `String` so it can sit in a
/// `HashMap` key or be compared directly against broker-reported subjects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subject(String);

impl Subject {
    /// Construct and validate a subject from an already-dotted string,
    /// without the `env.app` prefixing `from_topic`/`from_event` perform.
    /// Used internally and by the topology manager for patterns it derives
    /// itself (e.g. the DLQ subject).
    pub fn parse(raw: impl Into<String>) -> Result<Self, SubjectError> {
        let raw = raw.into();
        validate(&raw)?;
        Ok(Subject(raw))
    }

    pub fn from_topic(env: &str, app: &str, topic: &str) -> Result<Self, SubjectError> {
        let normalized_topic = normalize(topic);
        Self::parse(format!("{env}.{app}.{normalized_topic}"))
    }

    pub fn from_event(env: &str, app: &str, domain: &str, resource: &str, action: &str) -> Result<Self, SubjectError> {
        let dra = format!("{domain}.{resource}.{action}");
        let normalized = normalize(&dra);
        Self::parse(format!("{env}.{app}.{normalized}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn tokens(&self) -> Vec<&str> {
        self.0.split('.').collect()
    }

    /// NATS-style wildcard matching: `pattern` may contain `*`/`>`, `concrete`
    /// must not. `*` consumes exactly one token; `>` (only ever the final
    /// pattern token, enforced at construction) consumes one or more
    /// remaining tokens.
    pub fn matches(pattern: &Subject, concrete: &Subject) -> bool {
        matches_tokens(&pattern.tokens(), &concrete.tokens())
    }

    /// True iff some concrete subject matches both `a` and `b`. Symmetric and
    /// reflexive by construction (the recursion treats both sides
    /// identically and a subject trivially overlaps itself).
    pub fn overlaps(a: &Subject, b: &Subject) -> bool {
        overlaps_tokens(&a.tokens(), &b.tokens())
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Subject {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lower-cases ASCII letters and replaces any character outside
/// `[a-z0-9_.>*-]` with `_`; dots and wildcard characters pass through.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            let lowered = c.to_ascii_lowercase();
            match lowered {
                'a'..='z' | '0'..='9' | '_' | '.' | '>' | '*' | '-' => lowered,
                _ => '_',
            }
        })
        .collect()
}

fn validate(raw: &str) -> Result<(), SubjectError> {
    if raw.len() > MAX_SUBJECT_LEN {
        return Err(SubjectError::TooLong(raw.to_string()));
    }
    let tokens: Vec<&str> = raw.split('.').collect();
    let last_index = tokens.len() - 1;
    for (i, token) in tokens.iter().enumerate() {
        if token.is_empty() {
            return Err(SubjectError::EmptyToken(raw.to_string()));
        }
        if *token == ">" {
            if i != last_index {
                return Err(SubjectError::WildcardNotFinal(raw.to_string()));
            }
            continue;
        }
        if *token == "*" {
            continue;
        }
        if !token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(SubjectError::InvalidToken(raw.to_string()));
        }
    }
    Ok(())
}

fn matches_tokens(pattern: &[&str], concrete: &[&str]) -> bool {
    match pattern.first() {
        None => concrete.is_empty(),
        Some(&">") => !concrete.is_empty(),
        Some(&"*") => !concrete.is_empty() && matches_tokens(&pattern[1..], &concrete[1..]),
        Some(tok) => concrete.first() == Some(tok) && matches_tokens(&pattern[1..], &concrete[1..]),
    }
}

fn overlaps_tokens(a: &[&str], b: &[&str]) -> bool {
    match (a.first(), b.first()) {
        (None, None) => true,
        (None, Some(_)) | (Some(_), None) => false,
        (Some(&ha), Some(&hb)) => {
            if ha == ">" || hb == ">" {
                true
            } else if ha == "*" || hb == "*" || ha == hb {
                overlaps_tokens(&a[1..], &b[1..])
            } else {
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subj(s: &str) -> Subject {
        Subject::parse(s).unwrap()
    }

    #[test]
    fn from_topic_builds_prefixed_subject() {
        let s = Subject::from_topic("test", "shop", "order.created").unwrap();
        assert_eq!(s.as_str(), "test.shop.order.created");
    }

    #[test]
    fn normalization_lowercases_and_replaces_invalid_chars() {
        let s = Subject::from_topic("test", "shop", "Order Created!").unwrap();
        assert_eq!(s.as_str(), "test.shop.order_created_");
    }

    #[test]
    fn trailing_wildcard_matches_one_or_more_tokens_but_not_zero() {
        let pattern = subj("env.app.>");
        assert!(Subject::matches(&pattern, &subj("env.app.x")));
        assert!(Subject::matches(&pattern, &subj("env.app.x.y.z")));
        assert!(!Subject::matches(&pattern, &subj("env.app")));
    }

    #[test]
    fn star_matches_exactly_one_token() {
        let pattern = subj("env.app.order.*");
        assert!(Subject::matches(&pattern, &subj("env.app.order.created")));
        assert!(!Subject::matches(&pattern, &subj("env.app.order.created.extra")));
        assert!(!Subject::matches(&pattern, &subj("env.app.order")));
    }

    #[test]
    fn wildcard_not_in_final_position_is_rejected() {
        assert!(matches!(Subject::parse("env.app.>.oops"), Err(SubjectError::WildcardNotFinal(_))));
    }

    #[test]
    fn overlaps_is_symmetric_and_reflexive() {
        let a = subj("env.app.order.*");
        let b = subj("env.app.order.created");
        assert!(Subject::overlaps(&a, &b));
        assert!(Subject::overlaps(&b, &a));
        assert!(Subject::overlaps(&a, &a));

        let c = subj("env.app.user.created");
        assert!(!Subject::overlaps(&a, &c));
    }

    #[test]
    fn overlaps_through_trailing_wildcard() {
        let a = subj("env.app.>");
        let b = subj("env.app.order.created");
        assert!(Subject::overlaps(&a, &b));
        assert!(Subject::overlaps(&b, &a));
    }

    #[test]
    fn equal_subjects_compare_equal_as_strings() {
        let a = Subject::from_topic("test", "shop", "order.created").unwrap();
        let b = Subject::from_topic("test", "shop", "order.created").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_subjects_over_max_length() {
        let long_topic = "a".repeat(300);
        assert!(matches!(Subject::from_topic("env", "app", &long_topic), Err(SubjectError::TooLong(_))));
    }
}
