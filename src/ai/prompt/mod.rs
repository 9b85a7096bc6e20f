//! Prompt Builder System
//!
//! Standardized prompt construction for generative-service requests.
//! Every prompt follows the same layout: role, numbered rules, tagged data
//! sections, and a closing focus block restating the output constraint.

/// Prompt section types
#[derive(Debug, Clone)]
pub enum PromptSection {
    /// Role definition with expertise area
    Role { expertise: String, task: String },
    /// Numbered rules the output must follow
    Rules(Vec<String>),
    /// Raw text section with optional header
    Text {
        header: Option<String>,
        content: String,
    },
    /// Fenced block (JSON payloads, SQL samples)
    Code { language: String, content: String },
    /// Focus enforcement with restrictions
    Focus {
        target: String,
        restrictions: Vec<String>,
    },
}

/// Prompt builder for consistent prompt construction
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    sections: Vec<PromptSection>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a role definition section
    pub fn role(mut self, expertise: &str, task: &str) -> Self {
        self.sections.push(PromptSection::Role {
            expertise: expertise.to_string(),
            task: task.to_string(),
        });
        self
    }

    /// Add numbered rules
    pub fn rules<I, S>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sections
            .push(PromptSection::Rules(rules.into_iter().map(Into::into).collect()));
        self
    }

    /// Add text section with header
    pub fn section(mut self, header: &str, content: &str) -> Self {
        self.sections.push(PromptSection::Text {
            header: Some(header.to_string()),
            content: content.to_string(),
        });
        self
    }

    /// Add text section without header
    pub fn text(mut self, content: &str) -> Self {
        self.sections.push(PromptSection::Text {
            header: None,
            content: content.to_string(),
        });
        self
    }

    /// Add code block
    pub fn code(mut self, language: &str, content: &str) -> Self {
        self.sections.push(PromptSection::Code {
            language: language.to_string(),
            content: content.to_string(),
        });
        self
    }

    /// Add focus enforcement section
    pub fn focus(mut self, target: &str, restrictions: &[&str]) -> Self {
        self.sections.push(PromptSection::Focus {
            target: target.to_string(),
            restrictions: restrictions.iter().map(|r| r.to_string()).collect(),
        });
        self
    }

    /// Build the final prompt string
    pub fn build(self) -> String {
        let mut prompt = String::new();

        for section in self.sections {
            match section {
                PromptSection::Role { expertise, task } => {
                    prompt.push_str("<ROLE>\n");
                    prompt.push_str(&format!("You are an expert {} {}.\n", expertise, task));
                    prompt.push_str("</ROLE>\n\n");
                }
                PromptSection::Rules(rules) => {
                    prompt.push_str("<RULES>\n");
                    for (i, rule) in rules.iter().enumerate() {
                        prompt.push_str(&format!("{}. {}\n", i + 1, rule));
                    }
                    prompt.push_str("</RULES>\n\n");
                }
                PromptSection::Text { header, content } => {
                    if let Some(h) = header {
                        prompt.push_str(&format!("# {}\n\n", h));
                    }
                    prompt.push_str(&content);
                    prompt.push_str("\n\n");
                }
                PromptSection::Code { language, content } => {
                    prompt.push_str(&format!("```{}\n", language));
                    prompt.push_str(&content);
                    prompt.push_str("\n```\n\n");
                }
                PromptSection::Focus {
                    target,
                    restrictions,
                } => {
                    prompt.push_str("<FOCUS>\n");
                    prompt.push_str(&format!("IMPORTANT: {}\n", target));
                    for restriction in restrictions {
                        prompt.push_str(&format!("- {}\n", restriction));
                    }
                    prompt.push_str("</FOCUS>\n\n");
                }
            }
        }

        prompt.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_and_rules() {
        let prompt = PromptBuilder::new()
            .role("transit data engineer", "writing SQL templates")
            .rules(["Use named placeholders", "Always include LIMIT"])
            .build();

        assert!(prompt.starts_with("<ROLE>"));
        assert!(prompt.contains("transit data engineer writing SQL templates"));
        assert!(prompt.contains("1. Use named placeholders"));
        assert!(prompt.contains("2. Always include LIMIT"));
    }

    #[test]
    fn test_sections_keep_order() {
        let prompt = PromptBuilder::new()
            .section("Domain", "four tables")
            .code("json", "{\"a\":1}")
            .focus("Return JSON only", &["No markdown"])
            .build();

        let domain = prompt.find("# Domain").unwrap();
        let code = prompt.find("```json").unwrap();
        let focus = prompt.find("<FOCUS>").unwrap();
        assert!(domain < code && code < focus);
        assert!(prompt.ends_with("</FOCUS>"));
    }
}
