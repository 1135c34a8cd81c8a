/// Catalog search term for a vibe label.
/// Curated vibes get hand-tuned terms; anything else falls back to
/// "<vibe> music" so unmapped labels still return something sensible.
pub fn search_term(vibe: &str) -> String {
    match vibe.to_lowercase().as_str() {
        "productivity" => "focus study lofi".to_string(),
        "creative" => "creative electronic experimental".to_string(),
        "relax" => "chill relax ambient".to_string(),
        other => format!("{other} music"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curated_vibes_have_fixed_terms() {
        assert_eq!(search_term("productivity"), "focus study lofi");
        assert_eq!(search_term("creative"), "creative electronic experimental");
        assert_eq!(search_term("relax"), "chill relax ambient");
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(search_term("Productivity"), "focus study lofi");
        assert_eq!(search_term("RELAX"), "chill relax ambient");
    }

    #[test]
    fn test_unmapped_vibe_falls_back_to_generic_term() {
        assert_eq!(search_term("workout"), "workout music");
        assert_eq!(search_term("Melancholy"), "melancholy music");
    }
}
