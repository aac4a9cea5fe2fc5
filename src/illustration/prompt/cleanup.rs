//! 提示词清理
//!
//! 文本模型经常无视“不要 markdown”的要求，这里按固定顺序去掉：
//! 开头的 `Prompt:` 标签、强调和标题标记、列表标记、编号，
//! 以及以 note / important / важно / примечание 开头的说明行，
//! 最后把剩余的行用空格合并成一行。

use std::sync::OnceLock;

use regex::Regex;

/// 清理规则，首次使用时编译
struct CleanupRules {
    leading_labels: Vec<Regex>,
    markup: Vec<Regex>,
    note_line: Regex,
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|_| Regex::new(r"$^").unwrap())
}

fn rules() -> &'static CleanupRules {
    static RULES: OnceLock<CleanupRules> = OnceLock::new();
    RULES.get_or_init(|| CleanupRules {
        leading_labels: vec![
            compile(r"(?i)^\*\*Prompt:\*\*"),
            compile(r"(?i)^\*\*prompt\*\*:?\s*"),
            compile(r"(?i)^prompt:?\s*"),
        ],
        markup: vec![
            compile(r"\*\*"),
            compile(r"\*"),
            compile(r"#{1,6}\s*"),
            compile(r"(?m)^[-•]\s*"),
            compile(r"(?m)^\d+\.\s*"),
        ],
        note_line: compile(r"(?i)^(важно|important|note|примечание):?"),
    })
}

/// 清理文本模型返回的提示词
pub fn clean_prompt(raw: &str) -> String {
    let rules = rules();
    let mut text = raw.trim().to_string();

    for label in &rules.leading_labels {
        text = label.replace(&text, "").into_owned();
    }

    for markup in &rules.markup {
        text = markup.replace_all(&text, "").into_owned();
    }

    text.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty() && !rules.note_line.is_match(line))
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_prompt_label_and_note_line() {
        assert_eq!(
            clean_prompt("**Prompt:** A cat. \n\nNote: be creative"),
            "A cat."
        );
    }

    #[test]
    fn test_strips_label_variants() {
        assert_eq!(clean_prompt("**prompt**: A red fox"), "A red fox");
        assert_eq!(clean_prompt("Prompt: misty harbor"), "misty harbor");
        assert_eq!(clean_prompt("PROMPT misty harbor"), "misty harbor");
    }

    #[test]
    fn test_strips_markup_and_joins_lines() {
        let raw = "## Scene\n- *Golden* light over **old** town\n2. Watercolor style\n\nВажно: без текста";
        assert_eq!(
            clean_prompt(raw),
            "Scene Golden light over old town Watercolor style"
        );
    }

    #[test]
    fn test_note_filter_is_case_insensitive() {
        let raw = "A lighthouse at dusk\nIMPORTANT: keep it simple\nПримечание: 80 слов";
        assert_eq!(clean_prompt(raw), "A lighthouse at dusk");
    }

    #[test]
    fn test_empty_after_cleanup() {
        assert_eq!(clean_prompt("**Prompt:**\nNote: nothing"), "");
        assert_eq!(clean_prompt("   "), "");
    }
}
