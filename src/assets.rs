//! Static assets embedded into the binary at compile time.

/// Prompt template for course summarisation. Carries a single `%s`
/// placeholder for the course name.
pub const COURSE_SUMMARY_PROMPT: &str =
    include_str!("../assets/templates/course_summary_prompt.txt");

/// Renders the course-summary system prompt for a given course.
#[must_use]
pub fn render_course_summary_prompt(course_name: &str) -> String {
    COURSE_SUMMARY_PROMPT.replacen("%s", course_name, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_carries_exactly_one_placeholder() {
        assert_eq!(COURSE_SUMMARY_PROMPT.matches("%s").count(), 1);
    }

    #[test]
    fn render_substitutes_course_name() {
        let prompt = render_course_summary_prompt("Operating Systems");
        assert!(prompt.contains("Operating Systems"));
        assert!(!prompt.contains("%s"));
    }
}
