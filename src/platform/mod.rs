pub mod telegram;

/// Decides whether a chat message is a dispense command.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keywords: Vec<String>,
    case_insensitive: bool,
}

impl KeywordMatcher {
    pub fn new(keywords: &[String], case_insensitive: bool) -> Self {
        let keywords = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(|k| {
                if case_insensitive {
                    k.to_lowercase()
                } else {
                    k.to_string()
                }
            })
            .collect();
        Self {
            keywords,
            case_insensitive,
        }
    }

    /// The whole message (ignoring surrounding whitespace) must equal a keyword.
    pub fn matches(&self, text: &str) -> bool {
        let text = text.trim();
        if self.case_insensitive {
            let lowered = text.to_lowercase();
            self.keywords.iter().any(|k| *k == lowered)
        } else {
            self.keywords.iter().any(|k| k == text)
        }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords() -> Vec<String> {
        vec!["Dispensar".to_string(), "dispensar".to_string()]
    }

    #[test]
    fn test_case_sensitive_matches_listed_variants_only() {
        let matcher = KeywordMatcher::new(&keywords(), false);
        assert!(matcher.matches("Dispensar"));
        assert!(matcher.matches("  dispensar\n"));
        assert!(!matcher.matches("DISPENSAR"));
        assert!(!matcher.matches("dispensar ahora"));
    }

    #[test]
    fn test_case_insensitive_folds() {
        let matcher = KeywordMatcher::new(&["Dispensar".to_string()], true);
        assert!(matcher.matches("DISPENSAR"));
        assert!(matcher.matches("dIsPeNsAr"));
        assert_eq!(matcher.keywords(), ["dispensar"]);
    }

    #[test]
    fn test_blank_keywords_are_ignored() {
        let matcher = KeywordMatcher::new(&["".to_string(), "  ".to_string()], false);
        assert!(!matcher.matches(""));
        assert!(matcher.keywords().is_empty());
    }
}
