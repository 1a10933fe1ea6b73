//! Test fixtures - module sources for the mock engine

pub fn default_42() -> &'static str {
    "export default 42;"
}

/// Imports one bytecode dependency and one conventional module (`cfg`).
pub fn fan_out(dep_specifier: &str) -> String {
    format!(
        r#"import dep from "{dep}";
import cfg, {{ foo, bar }} from "cfg";
export const fromDep = dep;
export const first = foo;
export const second = bar;
export default cfg;
"#,
        dep = dep_specifier
    )
}

pub fn greeting() -> &'static str {
    r#"const name = "bytecache";
export const greeting = { hello: name };
export default "hi";
"#
}

/// Default export read from a context global.
pub fn reads_global() -> &'static str {
    "export default answer;"
}

pub fn throws() -> &'static str {
    r#"export const before = 1;
throw "kaboom";
"#
}

pub fn syntax_error() -> &'static str {
    "export default"
}
