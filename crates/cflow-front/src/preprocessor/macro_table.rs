//! The macro definition table (spec §4.1).

use std::collections::HashMap;

use super::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinMacro {
    File,
    Line,
    Stdc,
    StdcVersion,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MacroDef {
    Object { replacement: Vec<Token> },
    Function {
        params: Vec<String>,
        variadic: bool,
        replacement: Vec<Token>,
    },
    Builtin(BuiltinMacro),
}

/// Maps macro names to their definitions. Lives for the duration of
/// preprocessing one translation unit; mutated only from the main
/// expansion loop (spec §5's single-threaded resource model).
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    macros: HashMap<String, MacroDef>,
}

impl MacroTable {
    pub fn new() -> Self {
        let mut table = MacroTable::default();
        table.macros.insert("__FILE__".to_string(), MacroDef::Builtin(BuiltinMacro::File));
        table.macros.insert("__LINE__".to_string(), MacroDef::Builtin(BuiltinMacro::Line));
        table
            .macros
            .insert("__STDC__".to_string(), MacroDef::Builtin(BuiltinMacro::Stdc));
        table.macros.insert(
            "__STDC_VERSION__".to_string(),
            MacroDef::Builtin(BuiltinMacro::StdcVersion),
        );
        table
    }

    pub fn define_object(&mut self, name: impl Into<String>, replacement: Vec<Token>) {
        self.macros.insert(name.into(), MacroDef::Object { replacement });
    }

    pub fn define_function(
        &mut self,
        name: impl Into<String>,
        params: Vec<String>,
        variadic: bool,
        replacement: Vec<Token>,
    ) {
        self.macros.insert(
            name.into(),
            MacroDef::Function { params, variadic, replacement },
        );
    }

    pub fn undefine(&mut self, name: &str) {
        self.macros.remove(name);
    }

    pub fn lookup(&self, name: &str) -> Option<&MacroDef> {
        self.macros.get(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_predefined() {
        let table = MacroTable::new();
        assert!(table.is_defined("__FILE__"));
        assert!(table.is_defined("__LINE__"));
        assert!(!table.is_defined("FOO"));
    }

    #[test]
    fn define_undefine_roundtrip() {
        let mut table = MacroTable::new();
        table.define_object("FOO", vec![]);
        assert!(table.is_defined("FOO"));
        table.undefine("FOO");
        assert!(!table.is_defined("FOO"));
    }

    #[test]
    fn function_macro_records_params_and_variadic_flag() {
        let mut table = MacroTable::new();
        table.define_function("MAX", vec!["a".into(), "b".into()], false, vec![]);
        match table.lookup("MAX") {
            Some(MacroDef::Function { params, variadic, .. }) => {
                assert_eq!(params, &vec!["a".to_string(), "b".to_string()]);
                assert!(!variadic);
            }
            _ => panic!("expected function macro"),
        }
    }
}
