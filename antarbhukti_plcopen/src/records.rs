use crate::error::{DocumentErrorKind, PlcOpenError};
use crate::parser::{Code, Variable};
use antarbhukti_sfc::{Location, Spanned, Value, ValueKind};

/// The records of an SFC, as the record file layout has them.
#[derive(Debug, Default)]
pub(crate) struct Records {
    steps: Vec<Value>,
    transitions: Vec<Value>,
    variables: Vec<Value>,
}

// Expression errors are located relative to the opening quote of a string value,
// which ST code does not have.
fn code(code: &Code) -> Value {
    let location = Location {
        column: code.location.column.saturating_sub(1),
        ..code.location
    };
    Value::str(code.text.clone(), location)
}

// The record type of an IEC 61131-3 elementary type.
fn elementary(name: &str) -> Option<&'static str> {
    match name.to_ascii_uppercase().as_str() {
        "BOOL" => Some("bool"),
        "SINT" | "INT" | "DINT" | "LINT" | "USINT" | "UINT" | "UDINT" | "ULINT" | "BYTE"
        | "WORD" | "DWORD" | "LWORD" => Some("int"),
        "STRING" | "WSTRING" => Some("string"),
        _ => None,
    }
}

impl Records {
    pub(crate) fn step(&mut self, name: &str, location: Location, action: Option<&Code>, initial: bool) {
        let mut fields = vec![("name", Value::str(name, location))];
        if let Some(action) = action {
            fields.push(("function", code(action)));
        }
        if initial {
            fields.push(("initial", Value::str("true", location)));
        }
        self.steps.push(Value::dict(fields, location));
    }

    pub(crate) fn transition(
        &mut self,
        source: (&str, Location),
        target: (&str, Location),
        guard: Option<&Code>,
        location: Location,
    ) {
        let mut fields = vec![
            ("src", Value::str(source.0, source.1)),
            ("tgt", Value::str(target.0, target.1)),
        ];
        if let Some(guard) = guard.filter(|guard| !guard.text.is_empty()) {
            fields.push(("guard", code(guard)));
        }
        self.transitions.push(Value::dict(fields, location));
    }

    pub(crate) fn variable(&mut self, variable: &Variable) -> Result<(), PlcOpenError> {
        let mut fields = vec![("name", Value::str(&variable.name, variable.location))];
        if let Some((name, location)) = &variable.r#type {
            let r#type = elementary(name).ok_or_else(|| {
                PlcOpenError::new(
                    DocumentErrorKind::Unsupported(format!(
                        "type '{name}' of variable '{}'",
                        variable.name
                    )),
                    *location,
                )
            })?;
            fields.push(("type", Value::str(r#type, *location)));
        }
        if let Some((init, location)) = &variable.init {
            let init = Code {
                text: init.clone(),
                location: *location,
            };
            fields.push(("init", code(&init)));
        }
        self.variables.push(Value::dict(fields, variable.location));
        Ok(())
    }

    pub(crate) fn into_tables(self, location: Location) -> Vec<(Spanned, Value)> {
        [
            ("variables", self.variables),
            ("steps", self.steps),
            ("transitions", self.transitions),
        ]
        .into_iter()
        .map(|(name, items)| {
            let name = Spanned {
                text: name.to_owned(),
                location,
            };
            let value = Value {
                kind: ValueKind::List(items),
                location,
            };
            (name, value)
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elementary_types() {
        assert_eq!(elementary("INT"), Some("int"));
        assert_eq!(elementary("udint"), Some("int"));
        assert_eq!(elementary("BOOL"), Some("bool"));
        assert_eq!(elementary("string"), Some("string"));
        assert_eq!(elementary("TIME"), None);
        assert_eq!(elementary("REAL"), None);
    }

    #[test]
    fn unsupported_type() {
        let location = Location { line: 3, column: 5 };
        let variable = Variable {
            name: "speed".to_owned(),
            location,
            r#type: Some(("REAL".to_owned(), location)),
            init: None,
        };
        let err = Records::default()
            .variable(&variable)
            .expect_err("REAL has no counterpart");
        assert_eq!(
            err.to_string(),
            "3:5: unsupported: type 'REAL' of variable 'speed'"
        );
    }
}
