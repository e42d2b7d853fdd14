use crate::types::TurnPoint;

pub const OFF_ROUTE_MESSAGE: &str = "You may be off the route. Please check the map.";

/// Announcement spoken when entering the approach zone of `current`.
///
/// `following` is the next turn point after `current`, if any. The preview
/// part is dropped when the rounded gap is 0 or the following turn has no
/// instruction. Returns None when there is nothing to say.
pub fn approach_message(
    current: &TurnPoint,
    following: Option<&TurnPoint>,
    rounding_m: f64,
) -> Option<String> {
    let direction = current.turn.instruction();
    let preview = following.and_then(|next| {
        let instruction = next.turn.instruction()?;
        let gap = current.position.distance_to(&next.position);
        let rounded = round_to(gap, rounding_m);
        (rounded > 0.0).then(|| format!("in approximately {:.0} meters, {}", rounded, instruction))
    });

    match (direction, preview) {
        (Some(direction), Some(preview)) => Some(format!(
            "{}, then, {}.",
            capitalize(direction),
            preview
        )),
        (Some(direction), None) => Some(format!("{}.", capitalize(direction))),
        (None, Some(preview)) => Some(format!("{}.", capitalize(&preview))),
        (None, None) => None,
    }
}

fn round_to(value: f64, step: f64) -> f64 {
    (value / step).round() * step
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
