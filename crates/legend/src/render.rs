use std::fmt::Write as _;

use crate::state::LegendState;
use crate::symbology::Swatch;

/// Renders the legend as an indented text tree, honoring expansion flags.
///
/// ```text
/// Legende
/// ▾ Aktuell
///   [x] Grundwasserstand (i: Referenzzeitraum 1991 - 2020)
///       ● #0002ff Extrem hoch (> 95. Perzentil)
/// ```
pub fn render_tree(state: &LegendState) -> String {
    let mut out = String::from("Legende\n");
    if !state.panel_open() {
        return out;
    }
    for group in state.groups() {
        let marker = if group.expanded { '▾' } else { '▸' };
        let _ = writeln!(out, "{marker} {}", group.label);
        if !group.expanded {
            continue;
        }
        for layer in &group.layers {
            let check = if layer.visible { "[x]" } else { "[ ]" };
            let _ = write!(out, "  {check} {}", layer.label);
            if let Some(tip) = &layer.tooltip {
                let _ = write!(out, " (i: {tip})");
            }
            out.push('\n');
            if !layer.expanded {
                continue;
            }
            for entry in &layer.symbology {
                let glyph = match entry.swatch(layer.kind) {
                    Swatch::Dot(c) => format!("● {c}"),
                    Swatch::Stroke(c) => format!("━ {c}"),
                    Swatch::Fill(c) => format!("■ {c}"),
                    Swatch::Icon { image } => format!("⚑ {image}"),
                };
                let _ = writeln!(out, "      {glyph} {}", entry.label);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::render_tree;
    use crate::presets;
    use crate::state::LegendAction;

    #[test]
    fn renders_visibility_and_symbology() {
        let s = presets::groundwater().unwrap();
        let text = render_tree(&s);
        assert!(text.starts_with("Legende\n▾ Aktuell\n"));
        assert!(text.contains("  [x] Grundwasserstand (i: Referenzzeitraum 1991 - 2020)\n"));
        assert!(text.contains("      ● #0002ff Extrem hoch (> 95. Perzentil)\n"));
        assert!(text.contains("      ━ #ff0000 Südgrenze"));
    }

    #[test]
    fn collapsed_group_hides_layers() {
        let s = presets::groundwater()
            .unwrap()
            .reduce(&LegendAction::toggle_expanded_group("Andere"))
            .unwrap()
            .reduce(&LegendAction::toggle_visibility("Aktuell", "gws-latest"))
            .unwrap();
        let text = render_tree(&s);
        assert!(text.contains("▸ Andere\n"));
        assert!(!text.contains("Wasserschutzgebiete"));
        assert!(text.contains("  [ ] Grundwasserstand"));
    }

    #[test]
    fn closed_panel_renders_header_only() {
        let s = presets::groundwater()
            .unwrap()
            .reduce(&LegendAction::TogglePanel)
            .unwrap();
        assert_eq!(render_tree(&s), "Legende\n");
    }
}
