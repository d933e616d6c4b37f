// Expression sanitization for evaluate requests
//
// Users paste statements, not expressions. A leading `return` or `await`
// is dropped and a leading `{` is parenthesized so the engine parses an
// object literal instead of a block.

/// Rewrite a user expression into something the engine will evaluate.
pub fn sanitize_expression(expression: &str) -> String {
    let mut trimmed = expression.trim();

    for prefix in ["return ", "await "] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            trimmed = rest.trim_start();
        }
    }

    if trimmed.starts_with('{') {
        format!("({})", trimmed)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::sanitize_expression;

    #[test]
    fn test_strips_leading_return_and_await() {
        assert_eq!(sanitize_expression("return x + 1"), "x + 1");
        assert_eq!(sanitize_expression("await fetch(url)"), "fetch(url)");
        assert_eq!(sanitize_expression("return await p"), "p");
    }

    #[test]
    fn test_wraps_object_literal() {
        assert_eq!(sanitize_expression("{a: 1}"), "({a: 1})");
        assert_eq!(sanitize_expression("return {a: 1}"), "({a: 1})");
    }

    #[test]
    fn test_leaves_expressions_alone() {
        assert_eq!(sanitize_expression("x.returnValue"), "x.returnValue");
        assert_eq!(sanitize_expression("  items[2] "), "items[2]");
        assert_eq!(sanitize_expression("awaited"), "awaited");
    }
}
