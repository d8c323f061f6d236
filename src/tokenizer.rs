//! Console command tokenizer.

/// Split a console command into an argument vector.
///
/// Whitespace separates tokens except inside double quotes. Quote characters are
/// stripped; a quoted span glued to unquoted text (`a"b c"`) stays one token.
/// Embedded quotes cannot be escaped, and an unterminated quote simply runs to the
/// end of the input.
pub fn tokenize(raw: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut in_quotes = false;

    for c in raw.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                // `""` is an explicit empty argument
                in_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}
