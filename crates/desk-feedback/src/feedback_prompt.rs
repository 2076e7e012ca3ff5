//! Rendering helpers for the rating prompt and published review text.

const RATING_LABELS: [(u8, &str, &str); 5] = [
    (5, "Outstanding", "Perfect service"),
    (4, "Great", "Very good"),
    (3, "Good", "Satisfactory"),
    (2, "Fair", "Could improve"),
    (1, "Poor", "Needs work"),
];

/// Renders the private prompt soliciting a rating for a closed ticket.
pub fn rating_prompt(summary: &str, handled_by: &str) -> String {
    let mut lines = Vec::new();
    lines.push("Rate your experience".to_string());
    lines.push(format!("Thanks for using our support for **{summary}**."));
    lines.push(format!("Handled by: {handled_by}"));
    lines.push(String::new());
    lines.push("Reply with a rating:".to_string());
    for (value, label, description) in RATING_LABELS {
        lines.push(format!("{value} - {label} ({description})"));
    }
    lines.join("\n")
}

/// Renders a five-slot star bar for a rating, e.g. `★★★★☆` for 4.
pub fn rating_stars(rating: u8) -> String {
    let filled = usize::from(rating.min(5));
    let mut stars = "★".repeat(filled);
    stars.push_str(&"☆".repeat(5 - filled));
    stars
}
