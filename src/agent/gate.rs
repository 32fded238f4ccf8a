//! Page-content gate.

/// Phrases that mark a question as being about the page currently open.
/// Matched as lowercase substrings.
const PAGE_PHRASES: &[&str] = &[
    // English
    "this page",
    "current page",
    "this article",
    "this document",
    "this site",
    "on the page",
    "the page says",
    "summarize the page",
    "summarise the page",
    "summarize this",
    "summarise this",
    "tl;dr",
    // Russian
    "эта страница",
    "этой странице",
    "эту страницу",
    "этой страницы",
    "текущая страница",
    "текущей странице",
    "текущую страницу",
    "на странице",
    "эта статья",
    "этой статье",
    "эту статью",
    "этот документ",
    "этом документе",
    "перескажи",
    "кратко изложи",
    "о чем страница",
    "о чём страница",
];

/// Whether `text` asks about the currently open page.
///
/// Deterministic, case-insensitive phrase matching; runs before any
/// network call.
///
/// ```
/// use pagewise::agent::is_about_current_page;
///
/// assert!(is_about_current_page("Summarize THIS PAGE please"));
/// assert!(is_about_current_page("Что написано на этой странице?"));
/// assert!(!is_about_current_page("What's the weather in Paris?"));
/// ```
pub fn is_about_current_page(text: &str) -> bool {
    let lower = text.to_lowercase();
    PAGE_PHRASES.iter().any(|p| lower.contains(p))
}
