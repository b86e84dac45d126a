use crate::builder::{RichPresenceBuilder, Trigger, Value, ValueFormat, WireError, WireResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Achievement {
    pub id: u32,
    pub title: String,
    pub description: String,
    pub points: u32,
    pub badge: String,
    pub trigger: Trigger,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Leaderboard {
    pub title: String,
    pub description: String,
    pub start: Trigger,
    pub cancel: Trigger,
    pub submit: Trigger,
    pub value: Value,
    pub format: ValueFormat,
}

impl Leaderboard {
    /// `STA:<start>::CAN:<cancel>::SUB:<submit>::VAL:<value>`
    pub fn serialize(&self) -> String {
        format!(
            "STA:{}::CAN:{}::SUB:{}::VAL:{}",
            self.start, self.cancel, self.submit, self.value
        )
    }

    pub fn from_wire(
        title: impl Into<String>,
        description: impl Into<String>,
        format: ValueFormat,
        definition: &str,
    ) -> WireResult<Self> {
        let mut start = None;
        let mut cancel = None;
        let mut submit = None;
        let mut value = None;

        for section in definition.split("::") {
            let (name, body) = section.split_once(':').ok_or_else(|| WireError::UnknownSection {
                name: section.to_string(),
            })?;
            match name.to_ascii_uppercase().as_str() {
                "STA" => start = Some(body.parse()?),
                "CAN" => cancel = Some(body.parse()?),
                "SUB" => submit = Some(body.parse()?),
                "VAL" => value = Some(body.parse()?),
                _ => {
                    return Err(WireError::UnknownSection {
                        name: name.to_string(),
                    });
                }
            }
        }

        Ok(Self {
            title: title.into(),
            description: description.into(),
            start: start.ok_or(WireError::MissingSection { name: "STA" })?,
            cancel: cancel.ok_or(WireError::MissingSection { name: "CAN" })?,
            submit: submit.ok_or(WireError::MissingSection { name: "SUB" })?,
            value: value.ok_or(WireError::MissingSection { name: "VAL" })?,
            format,
        })
    }
}

/// Everything a script registers while it runs.
#[derive(Debug, Clone, Default)]
pub struct AchievementScriptContext {
    pub title: Option<String>,
    pub game_id: Option<u32>,
    pub achievements: Vec<Achievement>,
    pub leaderboards: Vec<Leaderboard>,
    pub rich_presence: RichPresenceBuilder,
}

impl AchievementScriptContext {
    /// Reads the leading comment block: the first comment line is the game
    /// title and `#ID = n` sets the game id.
    pub fn read_header(&mut self, source: &str) {
        for (index, line) in source.lines().map(str::trim).enumerate() {
            let Some(comment) = line.strip_prefix("//") else {
                break;
            };
            let comment = comment.trim();
            if let Some(id) = comment.strip_prefix("#ID") {
                let id = id.trim_start().trim_start_matches('=').trim();
                match id.parse() {
                    Ok(id) => self.game_id = Some(id),
                    Err(_) => log::warn!("ignoring invalid game id in header: {id:?}"),
                }
            } else if index == 0 && !comment.is_empty() {
                self.title = Some(comment.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITION: &str =
        "STA:0xH000001=1::CAN:0xH000002=1::SUB:0xH000003=1$0xH000004=1::VAL:0xX000010*2_v5";

    #[test]
    fn leaderboard_round_trips() {
        let leaderboard = Leaderboard::from_wire("Fastest", "Beat it", ValueFormat::Frames, DEFINITION)
            .unwrap();
        assert_eq!(leaderboard.submit.alts.len(), 1);
        assert_eq!(leaderboard.serialize(), DEFINITION);
    }

    #[test]
    fn reads_title_and_id_from_header() {
        let mut context = AchievementScriptContext::default();
        context.read_header("// Sonic the Hedgehog\n// #ID = 1\nx = 1\n// #ID = 2\n");
        assert_eq!(context.title.as_deref(), Some("Sonic the Hedgehog"));
        assert_eq!(context.game_id, Some(1));

        let mut context = AchievementScriptContext::default();
        context.read_header("x = 1 // Not a header");
        assert_eq!(context.title, None);
    }

    #[test]
    fn leaderboard_requires_every_section() {
        let error = Leaderboard::from_wire(
            "t",
            "d",
            ValueFormat::Value,
            "STA:0xH000001=1::CAN:0xH000002=1::VAL:0xH000003",
        )
        .unwrap_err();
        assert_eq!(error, WireError::MissingSection { name: "SUB" });

        let error =
            Leaderboard::from_wire("t", "d", ValueFormat::Value, "XYZ:0xH000001=1").unwrap_err();
        assert_eq!(
            error,
            WireError::UnknownSection {
                name: "XYZ".to_string()
            }
        );
    }
}
