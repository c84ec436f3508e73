use agentify_persist::DEFAULT_THREAD_TITLE;

const TITLE_WORDS: usize = 4;

/// Title for a thread opened by `message`: its first four words, with an
/// ellipsis once the message reaches four words.
pub fn derive_title(message: &str) -> String {
    let words: Vec<&str> = message.split_whitespace().take(TITLE_WORDS).collect();
    if words.is_empty() {
        return DEFAULT_THREAD_TITLE.to_string();
    }

    let mut title = words.join(" ");
    if words.len() == TITLE_WORDS {
        title.push_str("...");
    }
    title
}
