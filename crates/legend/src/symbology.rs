use foundation::Color;
use serde::{Deserialize, Serialize};

/// Geometry class of a legend layer, as written in legend configs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegendKind {
    Point,
    Line,
    Polygon,
    Raster,
    Marker,
}

/// How a legend swatch is drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Swatch {
    Dot(Color),
    Stroke(Color),
    Fill(Color),
    /// Marker image; falls back to a dot when the entry carries no image.
    Icon { image: String },
}

/// One row of a layer's symbology list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbologyEntry {
    pub label: String,
    pub color: Color,
    /// Overrides the layer's kind for this row (e.g. the outline of a polygon layer).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<LegendKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl SymbologyEntry {
    pub fn new(label: impl Into<String>, color: Color) -> Self {
        Self {
            label: label.into(),
            color,
            kind: None,
            image: None,
        }
    }

    pub fn with_kind(mut self, kind: LegendKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn swatch(&self, layer_kind: LegendKind) -> Swatch {
        match self.kind.unwrap_or(layer_kind) {
            LegendKind::Point => Swatch::Dot(self.color),
            LegendKind::Line => Swatch::Stroke(self.color),
            LegendKind::Polygon | LegendKind::Raster => Swatch::Fill(self.color),
            LegendKind::Marker => match &self.image {
                Some(image) => Swatch::Icon {
                    image: image.clone(),
                },
                None => Swatch::Dot(self.color),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LegendKind, Swatch, SymbologyEntry};
    use foundation::Color;

    #[test]
    fn entry_kind_overrides_layer_kind() {
        let red = Color::rgb(255, 0, 0);
        let outline = SymbologyEntry::new("Südgrenze", red).with_kind(LegendKind::Line);
        assert_eq!(outline.swatch(LegendKind::Polygon), Swatch::Stroke(red));

        let plain = SymbologyEntry::new("Zone I", red);
        assert_eq!(plain.swatch(LegendKind::Polygon), Swatch::Fill(red));
        assert_eq!(plain.swatch(LegendKind::Raster), Swatch::Fill(red));
    }

    #[test]
    fn marker_without_image_falls_back_to_dot() {
        let c = Color::rgb(0, 0, 0);
        let entry = SymbologyEntry::new("pin", c);
        assert_eq!(entry.swatch(LegendKind::Marker), Swatch::Dot(c));
    }

    #[test]
    fn deserializes_config_rows() {
        let e: SymbologyEntry =
            serde_json::from_str(r##"{"label":"Zone I","color":"#4A4DEF","type":"POLYGON"}"##)
                .unwrap();
        assert_eq!(e.kind, Some(LegendKind::Polygon));
        assert_eq!(e.color, Color::rgb(0x4a, 0x4d, 0xef));
    }
}
