//! Output escaping for LaTeX and CSV templates.

use std::fmt::Write as _;
use std::sync::LazyLock;

use minijinja::{AutoEscape, Error, Output, State, Value, escape_formatter};
use regex::Regex;

/// Escape strategy name for LaTeX templates.
pub const TEX: &str = "tex";

/// Escape strategy name for CSV templates.
pub const CSV: &str = "csv";

/// Replacements applied in order by [`escape_tex`].
static TEX_REPLACEMENTS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\\(\s)", r"\textbackslash\ $1"),
        (r"\\(\S)", r"\textbackslash $1"),
        (r"&", r"\&"),
        (r"%", r"\%"),
        (r"\$", r"\textdollar "),
        (r">>", r"\textgreater\textgreater "),
        (r"_", r"\_"),
        (r"\^", r"\^"),
        (r"#", r"\#"),
        (r#""(\s)"#, r"\textquotedbl\ $1"),
        (r#""(\S)"#, r"\textquotedbl $1"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| {
        (
            Regex::new(pattern).expect("valid TeX escape pattern"),
            replacement,
        )
    })
    .collect()
});

/// Escape text for inclusion in a LaTeX document.
pub fn escape_tex(text: &str) -> String {
    let mut out = text.to_owned();
    for (pattern, replacement) in TEX_REPLACEMENTS.iter() {
        out = pattern.replace_all(&out, *replacement).into_owned();
    }
    out
}

/// Escape a CSV cell, quoting it when it contains quotes or commas.
pub fn escape_csv(text: &str) -> String {
    let out = text.replace('"', "\"\"");
    if out.contains('"') || out.contains(',') {
        format!("\"{out}\"")
    } else {
        out
    }
}

/// Auto-escape strategy for a template file name.
pub(crate) fn auto_escape_for(name: &str) -> AutoEscape {
    let name = name.strip_suffix(".jinja").unwrap_or(name);
    match name.rsplit_once('.').map(|(_, format)| format) {
        Some("tex") => AutoEscape::Custom(TEX),
        Some("csv") => AutoEscape::Custom(CSV),
        Some("html" | "htm" | "xml") => AutoEscape::Html,
        _ => AutoEscape::None,
    }
}

/// Formatter applying the `tex` and `csv` strategies, and the built-in
/// ones otherwise.
pub(crate) fn formatter(out: &mut Output<'_>, state: &State<'_, '_>, value: &Value) -> Result<(), Error> {
    let escape: fn(&str) -> String = match state.auto_escape() {
        AutoEscape::Custom(TEX) => escape_tex,
        AutoEscape::Custom(CSV) => escape_csv,
        _ => return escape_formatter(out, state, value),
    };
    if value.is_undefined() || value.is_none() {
        return Ok(());
    }
    if value.is_safe() {
        out.write_str(&value.to_string())?;
    } else if let Some(text) = value.as_str() {
        out.write_str(&escape(text))?;
    } else {
        out.write_str(&escape(&value.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_tex() {
        assert_eq!(escape_tex("A$B\""), r#"A\textdollar B""#);
        assert_eq!(escape_tex("50% & more"), r"50\% \& more");
        assert_eq!(escape_tex("a_b^c #1"), r"a\_b\^c \#1");
        assert_eq!(escape_tex(r"C:\dir"), r"C:\textbackslash dir");
        assert_eq!(escape_tex("x >> y"), r"x \textgreater\textgreater  y");
        assert_eq!(escape_tex(r#"say "hi" now"#), r"say \textquotedbl hi\textquotedbl\  now");
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv(""), "");
    }

    #[test]
    fn test_auto_escape_for() {
        assert!(matches!(auto_escape_for("page.tex.jinja"), AutoEscape::Custom(TEX)));
        assert!(matches!(auto_escape_for("list.csv.jinja"), AutoEscape::Custom(CSV)));
        assert!(matches!(auto_escape_for("index.html.jinja"), AutoEscape::Html));
        assert!(matches!(auto_escape_for("feed.txt.jinja"), AutoEscape::None));
    }

    #[test]
    fn test_formatter_applies_custom_escapes() {
        let mut env = minijinja::Environment::new();
        env.set_auto_escape_callback(auto_escape_for);
        env.set_formatter(formatter);
        env.add_template("a.tex.jinja", "{{ v }}|{{ v|safe }}|{{ n }}")
            .unwrap();
        env.add_template("a.csv.jinja", "{{ v }},{{ 5 }}").unwrap();
        env.add_template("a.html.jinja", "{{ v }}").unwrap();

        let ctx = minijinja::context! { v => "50%, \"ok\"", n => () };
        assert_eq!(
            env.get_template("a.tex.jinja").unwrap().render(&ctx).unwrap(),
            r#"50\%, \textquotedbl ok"|50%, "ok"|"#
        );
        assert_eq!(
            env.get_template("a.csv.jinja").unwrap().render(&ctx).unwrap(),
            "\"50%, \"\"ok\"\"\",5"
        );
        assert_eq!(
            env.get_template("a.html.jinja").unwrap().render(&ctx).unwrap(),
            "50%, &quot;ok&quot;"
        );
    }
}
