use unicode_segmentation::UnicodeSegmentation;

/// First `max_len` graphemes of the first line of `s`, with an ellipsis if anything was cut.
pub fn excerpt(s: &str, max_len: usize) -> String {
    let line = s.lines().next().unwrap_or_default();
    let mut graphemes = line.graphemes(true);
    let head = graphemes.by_ref().take(max_len).collect::<String>();
    if graphemes.next().is_some() || line.len() < s.trim_end().len() {
        head + "..."
    } else {
        head
    }
}
