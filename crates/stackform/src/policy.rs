//! Policy document templating.
//!
//! Policy documents are JSON files that may contain `${name}` placeholders.
//! Placeholders are replaced by literal text *before* the document is parsed,
//! so a value may land anywhere in the document, inside or outside a string.
use std::{collections::BTreeMap, path::Path};

use snafu::ResultExt;

use crate::{NotFoundSnafu, ParseSnafu, Result};

/// Placeholder name to replacement text.
pub type Substitutions = BTreeMap<String, String>;

/// Replaces every `${key}` token in `text` with its value.
///
/// Placeholders without an entry in `substitutions` are left as they are.
pub fn substitute(text: &str, substitutions: &Substitutions) -> String {
    substitutions
        .iter()
        .fold(text.to_owned(), |acc, (key, value)| {
            acc.replace(&format!("${{{key}}}"), value)
        })
}

/// Reads the template at `location`, substitutes placeholders and parses the
/// result.
///
/// Fails with [`Error::NotFound`](crate::Error::NotFound) if the file cannot
/// be read and [`Error::Parse`](crate::Error::Parse) if the substituted text
/// is not well-formed JSON. The document schema is not checked.
pub fn render(
    location: impl AsRef<Path>,
    substitutions: &Substitutions,
) -> Result<serde_json::Value> {
    let path = location.as_ref();
    log::debug!("rendering policy template {path:?}");
    let template = std::fs::read_to_string(path).context(NotFoundSnafu { path })?;
    let text = substitute(&template, substitutions);
    let value = serde_json::from_str(&text).context(ParseSnafu { path })?;
    Ok(value)
}

/// Renders the template at `location` into compact JSON text, the form IAM
/// expects for policy documents.
pub fn render_string(location: impl AsRef<Path>, substitutions: &Substitutions) -> Result<String> {
    render(location, substitutions).map(|value| value.to_string())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::Error;

    fn template(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn subs(pairs: &[(&str, &str)]) -> Substitutions {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn reads_plain_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = template(&dir, "plain.json", r#"{"key": "value"}"#);
        let value = render(&path, &Substitutions::new()).unwrap();
        assert_eq!(json!({"key": "value"}), value);
    }

    #[test]
    fn replaces_supplied_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = template(&dir, "var.json", r#"{"key": "${variable}"}"#);
        let value = render(&path, &subs(&[("variable", "replacedValue")])).unwrap();
        assert_eq!(json!({"key": "replacedValue"}), value);
    }

    #[test]
    fn leaves_unsupplied_placeholders() {
        let text = "${a}-${b}-${a}";
        assert_eq!("1-${b}-1", substitute(text, &subs(&[("a", "1")])));
        assert_eq!(text, substitute(text, &Substitutions::new()));
    }

    #[test]
    fn only_exact_tokens_are_replaced() {
        let text = "$a ${a ${ab} {a} ${a}";
        assert_eq!("$a ${a ${ab} {a} X", substitute(text, &subs(&[("a", "X")])));
    }

    #[test]
    fn empty_substitutions_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let text = r#"{"Version": "2012-10-17", "Statement": [{"Effect": "Allow"}]}"#;
        let path = template(&dir, "round.json", text);
        let expected: serde_json::Value = serde_json::from_str(text).unwrap();
        assert_eq!(expected, render(&path, &Substitutions::new()).unwrap());
    }

    #[test]
    fn replaces_multiple_variables() {
        let dir = tempfile::tempdir().unwrap();
        let path = template(
            &dir,
            "policy.json",
            r#"{
    "Version": "2012-10-17",
    "Statement": [
        {
            "Sid": "cloudWatchLogs",
            "Effect": "Allow",
            "Action": ["logs:CreateLogStream", "logs:CreateLogGroup", "logs:PutLogEvents"],
            "Resource": [
                "arn:aws:logs:ap-northeast-1:${aws_account_id}:log-group:/aws/lambda/${lambda_func_name}:*",
                "arn:aws:logs:ap-northeast-1:${aws_account_id}:log-group:/aws/lambda/${lambda_func_name}:log-stream:*"
            ]
        }
    ]
}"#,
        );
        let value = render(
            &path,
            &subs(&[
                ("aws_account_id", "123456789012"),
                ("lambda_func_name", "lambda_test_func"),
            ]),
        )
        .unwrap();
        assert_eq!(
            json!({
                "Version": "2012-10-17",
                "Statement": [{
                    "Sid": "cloudWatchLogs",
                    "Effect": "Allow",
                    "Action": ["logs:CreateLogStream", "logs:CreateLogGroup", "logs:PutLogEvents"],
                    "Resource": [
                        "arn:aws:logs:ap-northeast-1:123456789012:log-group:/aws/lambda/lambda_test_func:*",
                        "arn:aws:logs:ap-northeast-1:123456789012:log-group:/aws/lambda/lambda_test_func:log-stream:*"
                    ]
                }]
            }),
            value
        );
    }

    #[test]
    fn missing_template_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = render(dir.path().join("nope.json"), &Substitutions::new()).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }), "{err}");
    }

    #[test]
    fn invalid_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = template(&dir, "bad.json", "invalid JSON");
        let err = render(&path, &Substitutions::new()).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }), "{err}");
    }

    #[test]
    fn unsupplied_bare_placeholder_fails_to_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = template(&dir, "count.json", r#"{"n": ${count}}"#);
        let err = render(&path, &Substitutions::new()).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }), "{err}");

        let value = render(&path, &subs(&[("count", "3")])).unwrap();
        assert_eq!(json!({"n": 3}), value);
    }

    #[test]
    fn renders_compact_string() {
        let dir = tempfile::tempdir().unwrap();
        let path = template(&dir, "spaced.json", "{\n  \"a\" : [ 1, 2 ]\n}");
        assert_eq!(r#"{"a":[1,2]}"#, render_string(&path, &Substitutions::new()).unwrap());
    }
}
