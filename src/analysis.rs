/// Marker the prompt instructs the model to place before each suggested URL,
/// one per line.
pub const LINK_MARKER: &str = "LINK: ";

/// Renders the fixed debugging prompt. User content is inserted verbatim, no
/// escaping.
pub fn build_prompt(error_message: &str, code: &str) -> String {
    format!(
        r#"Act as an expert debugger and senior software engineer.
I have the following code:

```
{code}
```

When I try to run this code, I encounter the following error:

```
{error_message}
```

Please provide the following in a clear, structured format:
1.  **Explanation:** A concise explanation of what this error means in the context of my code.
2.  **Suggested Fix(es):** One or more specific suggestions on how to fix the error. If possible, show the corrected code snippet(s) using markdown code blocks.
3.  **Relevant Web Links:** Three relevant web links (e.g., official documentation, Stack Overflow posts, helpful articles) that could help me understand and resolve this issue. Please provide the full URLs, each on a new line, and prefix each link with "{LINK_MARKER}".
    Example:
    LINK: https://example.com/doc1
    LINK: https://stackoverflow.com/q/12345
"#
    )
}

/// Scans generated text for marker lines and returns their payloads in
/// encounter order. Lines are trimmed before the prefix check and the payload
/// is trimmed again, so indentation and trailing spaces around the marker are
/// tolerated. Duplicates are kept; no URL-syntax validation happens here.
pub fn extract_links(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            line.trim()
                .strip_prefix(LINK_MARKER)
                .map(|rest| rest.trim().to_string())
        })
        .collect()
}
