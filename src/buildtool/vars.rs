//! Parsing of the build tool's environment dump.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(export )?(?P<var>\w+(_.*)?)="(?P<value>.*)"$"#).expect("valid variable regex")
});

static UNSET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^unset (?P<var>\w+)$").expect("valid unset regex"));

/// Comment line carrying the last value of an unexported variable.
const UNEXPORTED_PREFIX: &str = "#   \"";

/// Extract variable values from an environment dump.
///
/// Recognizes `NAME="value"` (optionally prefixed by `export `) and
/// `unset NAME`, the latter taking its value from a preceding
/// `#   "value"` comment line. Empty values count as unset.
///
/// With `names`, scanning stops once every requested name has been seen and
/// names never seen map to `None`. Without it, every variable found is
/// returned.
pub fn parse_env_dump(dump: &str, names: Option<&[&str]>) -> HashMap<String, Option<String>> {
    let mut wanted: Option<Vec<&str>> = names.map(|n| n.to_vec());
    let mut values = HashMap::new();
    let mut last_line: Option<&str> = None;

    for line in dump.lines() {
        if let Some((var, value)) = match_line(line, last_line) {
            match wanted.as_mut() {
                None => {
                    values.insert(var.to_string(), Some(value.to_string()));
                }
                Some(wanted) => {
                    if let Some(pos) = wanted.iter().position(|w| *w == var) {
                        wanted.swap_remove(pos);
                        values.insert(var.to_string(), Some(value.to_string()));
                    }
                    if wanted.is_empty() {
                        break;
                    }
                }
            }
        }
        last_line = Some(line);
    }

    for var in wanted.unwrap_or_default() {
        values.insert(var.to_string(), None);
    }
    values
}

fn match_line<'a>(line: &'a str, last_line: Option<&'a str>) -> Option<(&'a str, &'a str)> {
    let (var, value) = if let Some(caps) = VAR_RE.captures(line) {
        (caps.name("var")?.as_str(), caps.name("value")?.as_str())
    } else {
        let caps = UNSET_RE.captures(line)?;
        let value = last_line
            .filter(|l| l.starts_with(UNEXPORTED_PREFIX))
            .and_then(|l| l.split('"').nth(1))?;
        (caps.name("var")?.as_str(), value)
    };
    (!value.is_empty()).then_some((var, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = r#"#
# $FOO
FOO="bar"
export PATH="/usr/bin:/bin"
#   "qux"
unset BAZ
EMPTY=""
# $DISTRO_FEATURES:append [2 operations]
DISTRO_FEATURES:append=" systemd"
do_compile() {
    oe_runmake
}
"#;

    #[test]
    fn test_set_and_unset() {
        let vars = parse_env_dump("FOO=\"bar\"\n#   \"qux\"\nunset BAZ\n", None);
        assert_eq!(vars.len(), 2);
        assert_eq!(vars["FOO"], Some("bar".to_string()));
        assert_eq!(vars["BAZ"], Some("qux".to_string()));
    }

    #[test]
    fn test_all_variables() {
        let vars = parse_env_dump(DUMP, None);
        assert_eq!(vars["FOO"].as_deref(), Some("bar"));
        assert_eq!(vars["PATH"].as_deref(), Some("/usr/bin:/bin"));
        assert_eq!(vars["BAZ"].as_deref(), Some("qux"));
        assert!(!vars.contains_key("EMPTY"));
        assert!(!vars.contains_key("do_compile"));
    }

    #[test]
    fn test_requested_names_fill_missing() {
        let vars = parse_env_dump(DUMP, Some(&["FOO", "NOPE"]));
        assert_eq!(vars.len(), 2);
        assert_eq!(vars["FOO"].as_deref(), Some("bar"));
        assert_eq!(vars["NOPE"], None);
    }

    #[test]
    fn test_stops_after_all_found() {
        let dump = "FOO=\"first\"\nFOO=\"second\"\n";
        let vars = parse_env_dump(dump, Some(&["FOO"]));
        assert_eq!(vars["FOO"].as_deref(), Some("first"));

        let vars = parse_env_dump(dump, None);
        assert_eq!(vars["FOO"].as_deref(), Some("second"));
    }

    #[test]
    fn test_unset_without_comment() {
        let vars = parse_env_dump("# plain comment\nunset BAZ\n", Some(&["BAZ"]));
        assert_eq!(vars["BAZ"], None);
    }

    #[test]
    fn test_empty_value_is_unset() {
        let vars = parse_env_dump(DUMP, Some(&["EMPTY"]));
        assert_eq!(vars["EMPTY"], None);
    }
}
