//! System instructions for the generator

/// Stand-in for page content when retrieval failed
fn missing_context(url: &str) -> String {
    format!(
        "The user provided the URL {url} but its content could not be retrieved. \
         Use your search tool to find information about {url}."
    )
}

/// Instruction for conversation turns about the page at `url`
///
/// A blank `context` is treated as missing.
#[must_use]
pub fn respond_instruction(url: &str, context: &str) -> String {
    let context = if context.trim().is_empty() {
        missing_context(url)
    } else {
        context.to_string()
    };

    format!(
        "You are a helpful assistant discussing a website.\n\
         \n\
         WEBSITE CONTEXT:\n\
         {context}\n\
         \n\
         If the user asks about the website, answer only from the context provided.\n\
         If the context is missing or insufficient, or the user asks about anything outside \
         the page such as current events, you must use your search tool to find the answer.\n\
         Always answer concisely because your response will be spoken out loud. \
         Do not use lists, tables, headings or other formatting."
    )
}

/// Instruction for the opening summary of a page that could not be retrieved
#[must_use]
pub fn summarize_instruction() -> String {
    "You are a helpful assistant. The user wants to know about a specific website URL.\n\
     Use your search tool to find out what the website is about and give a brief, \
     engaging summary of two or three sentences.\n\
     Start by mentioning the name of the website or entity.\n\
     Your answer will be spoken out loud, so do not use any formatting."
        .to_string()
}

/// User prompt for the opening summary
#[must_use]
pub fn summarize_prompt(url: &str) -> String {
    format!("Summarize this website: {url}")
}
