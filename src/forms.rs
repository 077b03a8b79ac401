//! In-memory model of an HTML form, with jQuery-compatible
//! `serialize`/`unserializeForm` semantics. The engine owns the forms it
//! cares about (the main search form, section filter forms) and treats
//! the rendered markup purely as a render target.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Radio,
    Checkbox,
    Text,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    /// Submit value for radios/checkboxes, current value for text fields.
    pub value: String,
    /// The text of the label next to the control, used by title derivation.
    pub label: String,
    pub kind: FieldKind,
    pub checked: bool,
    pub visible: bool,
    /// The enclosing fieldset class (`search_options`, `search_order`, ...).
    pub group: Option<String>,
}

impl Field {
    pub fn radio(name: &str, value: &str, label: &str) -> Self {
        Field {
            name: name.to_string(),
            value: value.to_string(),
            label: label.to_string(),
            kind: FieldKind::Radio,
            checked: false,
            visible: true,
            group: None,
        }
    }

    pub fn checkbox(name: &str, label: &str) -> Self {
        Field {
            name: name.to_string(),
            value: "on".to_string(),
            label: label.to_string(),
            kind: FieldKind::Checkbox,
            checked: false,
            visible: true,
            group: None,
        }
    }

    pub fn text(name: &str) -> Self {
        Field {
            name: name.to_string(),
            value: String::new(),
            label: String::new(),
            kind: FieldKind::Text,
            checked: false,
            visible: true,
            group: None,
        }
    }

    pub fn checked(mut self) -> Self {
        self.checked = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }
}

#[derive(Default)]
pub struct UnserializeOptions<'a> {
    /// Overwrite text fields that already hold a value.
    pub override_values: bool,
    /// Per-key interceptor. Returning `true` means the key was handled;
    /// `false` falls through to the default field lookup.
    pub callback: Option<&'a mut dyn FnMut(&str, &str) -> bool>,
}

#[derive(Debug, Clone, Default)]
pub struct Form {
    fields: Vec<Field>,
}

fn encode_component(value: &str) -> String {
    // jQuery serializes spaces as '+'
    urlencoding::encode(value).replace("%20", "+")
}

fn decode_component(value: &str) -> String {
    let unplussed = value.replace('+', " ");
    match urlencoding::decode(&unplussed) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => unplussed,
    }
}

impl Form {
    pub fn new(fields: Vec<Field>) -> Self {
        Form { fields }
    }

    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub fn insert(&mut self, index: usize, field: Field) {
        let index = index.min(self.fields.len());
        self.fields.insert(index, field);
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut [Field] {
        &mut self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The checked field of a radio group / checkbox set.
    pub fn checked_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name && f.checked)
    }

    /// Value of the checked member of a radio group.
    pub fn checked_value(&self, name: &str) -> Option<&str> {
        self.checked_field(name).map(|f| f.value.as_str())
    }

    /// Current value of a text field.
    pub fn text_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name && f.kind == FieldKind::Text)
            .map(|f| f.value.as_str())
    }

    pub fn set_text(&mut self, name: &str, value: &str) {
        if let Some(field) = self
            .fields
            .iter_mut()
            .find(|f| f.name == name && f.kind == FieldKind::Text)
        {
            field.value = value.to_string();
        }
    }

    /// Check the group member carrying `value`, unchecking the rest.
    pub fn check(&mut self, name: &str, value: &str) {
        for field in self.fields.iter_mut().filter(|f| f.name == name) {
            field.checked = field.value == value;
        }
    }

    /// Checked fields belonging to a fieldset group, in field order.
    pub fn checked_in_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a Field> {
        self.fields
            .iter()
            .filter(move |f| f.checked && f.group.as_deref() == Some(group))
    }

    /// URL-encoded `k=v&...` of checked and text fields, in field order.
    pub fn serialize(&self) -> String {
        let mut parts = Vec::new();
        for field in &self.fields {
            let include = match field.kind {
                FieldKind::Text => true,
                FieldKind::Radio | FieldKind::Checkbox => field.checked,
            };
            if include {
                parts.push(format!(
                    "{}={}",
                    encode_component(&field.name),
                    encode_component(&field.value)
                ));
            }
        }
        parts.join("&")
    }

    /// Populate the form from a previously serialized string.
    pub fn unserialize(&mut self, values: &str, mut opts: UnserializeOptions<'_>) {
        let mut pairs: Vec<(String, String)> = Vec::new();
        for piece in values.split('&') {
            let Some((key, value)) = piece.split_once('=') else {
                continue;
            };
            let key = decode_component(key);
            let value = decode_component(value);
            // later occurrences of a key override earlier ones
            if let Some(existing) = pairs.iter_mut().find(|(k, _)| *k == key) {
                existing.1 = value;
            } else {
                pairs.push((key, value));
            }
        }

        // an unchecked box does not show up in a serialized form, so
        // start from a fully unchecked state
        for field in &mut self.fields {
            field.checked = false;
        }

        for (key, value) in pairs {
            if let Some(callback) = opts.callback.as_deref_mut() {
                if callback(&key, &value) {
                    continue;
                }
            }
            self.apply_value(&key, &value, opts.override_values);
        }
    }

    fn apply_value(&mut self, key: &str, value: &str, override_values: bool) {
        let matching: Vec<usize> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.name == key)
            .map(|(i, _)| i)
            .collect();

        if matching.len() > 1 {
            // multiple elements of the same name are radio buttons
            for index in matching {
                let field = &mut self.fields[index];
                field.checked = field.value == value;
            }
        } else if let Some(&index) = matching.first() {
            let field = &mut self.fields[index];
            match field.kind {
                FieldKind::Checkbox => field.checked = true,
                _ => {
                    if override_values || field.value.is_empty() {
                        field.value = value.to_string();
                    }
                }
            }
        }
    }
}
