// file: readings.rs
// desc: on/kun readings per character, loaded from JSON or extracted from KANJIDIC2

use std::collections::{BTreeMap, HashSet};

use quick_xml::Reader;
use quick_xml::events::Event;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readings {
    #[serde(default)]
    pub on: Vec<String>,
    #[serde(default)]
    pub kun: Vec<String>,
}

impl Readings {
    pub fn is_empty(&self) -> bool {
        self.on.is_empty() && self.kun.is_empty()
    }

    /// Text stored alongside a history entry, e.g. `音: ニチ、ジツ / 訓: ひ、か`.
    pub fn display_text(&self) -> String {
        let mut parts = Vec::with_capacity(2);
        if !self.on.is_empty() {
            parts.push(format!("音: {}", self.on.join("、")));
        }
        if !self.kun.is_empty() {
            parts.push(format!("訓: {}", self.kun.join("、")));
        }
        parts.join(" / ")
    }
}

/// Read-only lookup from character to readings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReadingsTable {
    entries: BTreeMap<char, Readings>,
}

impl ReadingsTable {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn get(&self, c: char) -> Option<&Readings> {
        self.entries.get(&c)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Extract readings from a KANJIDIC2 document for characters accepted by
    /// `supported`.
    ///
    /// Kun readings lose their okurigana (the part after `.`) and are
    /// de-duplicated; characters left without any reading are skipped.
    pub fn from_kanjidic(
        xml: &str,
        supported: impl Fn(char) -> bool,
    ) -> Result<Self, quick_xml::Error> {
        #[derive(PartialEq)]
        enum Field {
            None,
            Literal,
            On,
            Kun,
        }

        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut entries = BTreeMap::new();
        let mut literal: Option<char> = None;
        let mut current = Readings::default();
        let mut field = Field::None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => match e.name().as_ref() {
                    b"character" => {
                        literal = None;
                        current = Readings::default();
                    }
                    b"literal" => field = Field::Literal,
                    b"reading" => {
                        let kind = e
                            .try_get_attribute("r_type")?
                            .map(|attr| attr.value.into_owned());
                        field = match kind.as_deref() {
                            Some(b"ja_on") => Field::On,
                            Some(b"ja_kun") => Field::Kun,
                            _ => Field::None,
                        };
                    }
                    _ => {}
                },
                Event::Text(t) => {
                    let text = t.unescape()?;
                    match field {
                        Field::Literal => literal = text.chars().next(),
                        Field::On => current.on.push(text.into_owned()),
                        Field::Kun => {
                            let stem = text.split('.').next().unwrap_or_default();
                            current.kun.push(stem.to_string());
                        }
                        Field::None => {}
                    }
                }
                Event::End(e) => match e.name().as_ref() {
                    b"character" => {
                        if let Some(c) = literal.take().filter(|&c| supported(c)) {
                            let mut readings = std::mem::take(&mut current);
                            dedup_in_order(&mut readings.kun);
                            if !readings.is_empty() {
                                entries.insert(c, readings);
                            }
                        }
                    }
                    _ => field = Field::None,
                },
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(Self { entries })
    }
}

fn dedup_in_order(values: &mut Vec<String>) {
    let mut seen = HashSet::new();
    values.retain(|v| seen.insert(v.clone()));
}

impl FromIterator<(char, Readings)> for ReadingsTable {
    fn from_iter<I: IntoIterator<Item = (char, Readings)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KANJIDIC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kanjidic2>
<header><file_version>4</file_version></header>
<character>
<literal>日</literal>
<reading_meaning>
<rmgroup>
<reading r_type="pinyin">ri4</reading>
<reading r_type="ja_on">ニチ</reading>
<reading r_type="ja_on">ジツ</reading>
<reading r_type="ja_kun">ひ</reading>
<reading r_type="ja_kun">-び</reading>
<reading r_type="ja_kun">か</reading>
<meaning>day</meaning>
</rmgroup>
</reading_meaning>
</character>
<character>
<literal>生</literal>
<reading_meaning>
<rmgroup>
<reading r_type="ja_on">セイ</reading>
<reading r_type="ja_kun">い.きる</reading>
<reading r_type="ja_kun">い.かす</reading>
<reading r_type="ja_kun">う.まれる</reading>
</rmgroup>
</reading_meaning>
</character>
<character>
<literal>〆</literal>
</character>
<character>
<literal>鬱</literal>
<reading_meaning>
<rmgroup>
<reading r_type="ja_on">ウツ</reading>
</rmgroup>
</reading_meaning>
</character>
</kanjidic2>
"#;

    #[test]
    fn extracts_supported_characters() {
        let table = ReadingsTable::from_kanjidic(KANJIDIC, |c| c != '鬱').unwrap();
        assert_eq!(table.len(), 2);

        let day = table.get('日').unwrap();
        assert_eq!(day.on, vec!["ニチ", "ジツ"]);
        assert_eq!(day.kun, vec!["ひ", "-び", "か"]);

        let life = table.get('生').unwrap();
        assert_eq!(life.kun, vec!["い", "う"]);

        assert!(table.get('〆').is_none());
        assert!(table.get('鬱').is_none());
    }

    #[test]
    fn json_round_trip_uses_character_keys() {
        let table = ReadingsTable::from_json(r#"{"山": {"on": ["サン"], "kun": ["やま"]}, "川": {"kun": ["かわ"]}}"#)
            .unwrap();
        assert_eq!(table.get('川').unwrap().on, Vec::<String>::new());

        let json = table.to_json_pretty().unwrap();
        assert!(json.contains("\"山\""));
        assert_eq!(ReadingsTable::from_json(&json).unwrap(), table);
    }

    #[test]
    fn display_text_lists_both_kinds() {
        let readings = Readings {
            on: vec!["サン".into()],
            kun: vec!["やま".into()],
        };
        assert_eq!(readings.display_text(), "音: サン / 訓: やま");
        assert_eq!(Readings::default().display_text(), "");
    }
}
