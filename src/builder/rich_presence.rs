use std::fmt;

use crate::builder::trigger::Trigger;
use crate::builder::value::ValueFormat;

#[derive(Debug, Clone, PartialEq)]
struct Lookup {
    name: String,
    entries: Vec<(i64, String)>,
    fallback: String,
}

/// Collects rich presence macros and display strings and renders the script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RichPresenceBuilder {
    formats: Vec<(String, ValueFormat)>,
    lookups: Vec<Lookup>,
    conditional_displays: Vec<(Trigger, String)>,
    display: Option<String>,
}

impl RichPresenceBuilder {
    pub fn is_empty(&self) -> bool {
        self.display.is_none() && self.conditional_displays.is_empty()
    }

    pub fn display(&self) -> Option<&str> {
        self.display.as_deref()
    }

    pub fn has_conditional_displays(&self) -> bool {
        !self.conditional_displays.is_empty()
    }

    /// Registers a value macro. The same name may be reused only with the
    /// same format.
    pub fn add_value_format(&mut self, name: &str, format: ValueFormat) -> Result<(), String> {
        if let Some((_, existing)) = self.formats.iter().find(|(existing, _)| existing == name) {
            if *existing != format {
                return Err(format!(
                    "Multiple formats specified for rich presence value {name}"
                ));
            }
            return Ok(());
        }
        if self.lookups.iter().any(|lookup| lookup.name == name) {
            return Err(format!("{name} is already registered as a lookup"));
        }
        self.formats.push((name.to_string(), format));
        Ok(())
    }

    pub fn add_lookup(
        &mut self,
        name: &str,
        entries: Vec<(i64, String)>,
        fallback: String,
    ) -> Result<(), String> {
        let lookup = Lookup {
            name: name.to_string(),
            entries,
            fallback,
        };
        if let Some(existing) = self.lookups.iter().find(|existing| existing.name == name) {
            if *existing != lookup {
                return Err(format!("Multiple definitions for rich presence lookup {name}"));
            }
            return Ok(());
        }
        if self.formats.iter().any(|(existing, _)| existing == name) {
            return Err(format!("{name} is already registered as a value"));
        }
        self.lookups.push(lookup);
        Ok(())
    }

    pub fn set_display(&mut self, text: String) -> Result<(), String> {
        if self.display.is_some() {
            return Err("Only one rich_presence_display may be specified".to_string());
        }
        self.display = Some(text);
        Ok(())
    }

    pub fn add_conditional_display(&mut self, condition: Trigger, text: String) {
        self.conditional_displays.push((condition, text));
    }
}

impl fmt::Display for RichPresenceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, format) in &self.formats {
            writeln!(f, "Format:{name}")?;
            writeln!(f, "FormatType={format}")?;
            writeln!(f)?;
        }
        for lookup in &self.lookups {
            writeln!(f, "Lookup:{}", lookup.name)?;
            for (key, text) in &lookup.entries {
                writeln!(f, "{key}={text}")?;
            }
            if !lookup.fallback.is_empty() {
                writeln!(f, "*={}", lookup.fallback)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "Display:")?;
        for (condition, text) in &self.conditional_displays {
            writeln!(f, "?{condition}?{text}")?;
        }
        if let Some(display) = &self.display {
            writeln!(f, "{display}")?;
        }
        Ok(())
    }
}
