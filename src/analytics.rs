//! Datos del panel de analítica: imágenes estáticas, leyendas y el mapa
//! interactivo pre-serializado (especificación de figura Plotly en JSON).

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 2] = [".png", ".jpg"];

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

/// Leyendas fijas por nombre exacto de fichero.
const CAPTIONS: [(&str, &str); 4] = [
    (
        "cancellation_rate.png",
        "Cancellation Rate as Percentage of Total Bookings",
    ),
    ("revenue_trends.png", "Revenue Trends Over Time"),
    ("lead_time_distribution.png", "Booking Lead Time Distribution"),
    ("revenue_by_country.png", "Revenue by Country"),
];

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalyticsData {
    pub analytics_images: Vec<String>,
    pub captions: BTreeMap<String, String>,
    pub plot_html: Option<String>,
}

/// Reúne las imágenes, las leyendas y el fragmento HTML del mapa.
/// Ningún fallo aquí es fatal: se registra y se devuelve el valor por defecto.
pub fn collect_analytics(analytics_dir: &Path, plot_file: &Path) -> AnalyticsData {
    let analytics_images = match list_images(analytics_dir) {
        Ok(images) => {
            info!("{} imágenes de analítica encontradas", images.len());
            images
        }
        Err(e) => {
            error!("Error cargando imágenes de analítica: {e:#}");
            Vec::new()
        }
    };

    let plot_html = match load_plot(plot_file) {
        Ok(html) => Some(html),
        Err(e) => {
            error!("Error cargando el gráfico: {e:#}");
            None
        }
    };

    AnalyticsData {
        analytics_images,
        captions: captions(),
        plot_html,
    }
}

pub fn captions() -> BTreeMap<String, String> {
    CAPTIONS
        .iter()
        .map(|(file, caption)| (file.to_string(), caption.to_string()))
        .collect()
}

/// Ficheros `.png`/`.jpg` del directorio (sin recursión), ordenados por nombre.
fn list_images(dir: &Path) -> Result<Vec<String>> {
    let mut images = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(anyhow::Error::new(e)
                    .context(format!("No se pudo listar {}", dir.display())));
            }
            Err(e) => {
                warn!("Entrada ilegible en {}: {}", dir.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if IMAGE_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
            images.push(name);
        }
    }
    images.sort();
    Ok(images)
}

fn load_plot(plot_file: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(plot_file)
        .with_context(|| format!("No se pudo leer {}", plot_file.display()))?;
    render_plot_fragment(&raw)
}

/// Convierte una figura Plotly serializada en un fragmento HTML embebible
/// (un `div` más el script que la dibuja).
pub fn render_plot_fragment(raw: &str) -> Result<String> {
    let figure: Value = serde_json::from_str(raw).context("JSON de figura inválido")?;
    let data = figure
        .get("data")
        .filter(|d| d.is_array())
        .ok_or_else(|| anyhow!("La figura no contiene un array 'data'"))?;
    let layout = figure.get("layout").cloned().unwrap_or_else(|| json!({}));
    let config = json!({ "responsive": true });

    let div_id = Uuid::new_v4().to_string();
    Ok(format!(
        r#"<div>
<script charset="utf-8" src="{cdn}"></script>
<div id="{id}" class="plotly-graph-div" style="height:100%; width:100%;"></div>
<script type="text/javascript">
window.PLOTLYENV = window.PLOTLYENV || {{}};
if (document.getElementById("{id}")) {{
    Plotly.newPlot("{id}", {data}, {layout}, {config});
}}
</script>
</div>"#,
        cdn = PLOTLY_CDN,
        id = div_id,
        data = script_safe_json(data)?,
        layout = script_safe_json(&layout)?,
        config = script_safe_json(&config)?,
    ))
}

/// JSON apto para incrustar dentro de `<script>`: `<`, `>` y `&` solo pueden
/// aparecer dentro de cadenas, donde el escape `\uXXXX` es equivalente.
fn script_safe_json(value: &Value) -> Result<String> {
    Ok(serde_json::to_string(value)?
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn only_images_are_listed_and_unknown_ones_have_no_caption() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["revenue_trends.png", "custom_chart.jpg", "notes.txt", "logo.PNG"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("nested.png")).unwrap();

        let data = collect_analytics(dir.path(), &dir.path().join("missing.json"));
        assert_eq!(data.analytics_images, vec!["custom_chart.jpg", "revenue_trends.png"]);
        assert_eq!(
            data.captions.get("revenue_trends.png").map(String::as_str),
            Some("Revenue Trends Over Time")
        );
        assert!(data.captions.get("custom_chart.jpg").is_none());
        assert_eq!(data.captions.len(), 4);
        assert!(data.plot_html.is_none());
    }

    #[test]
    fn missing_directory_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let data = collect_analytics(&dir.path().join("nope"), &dir.path().join("nope.json"));
        assert!(data.analytics_images.is_empty());
        assert_eq!(data.captions.len(), 4);
    }

    #[test]
    fn plot_fragment_embeds_data_and_layout() {
        let raw = r#"{"data":[{"type":"choropleth","locations":["PRT","GBR"],"z":[10,5]}],"layout":{"title":{"text":"Guests by country"}}}"#;
        let html = render_plot_fragment(raw).unwrap();
        assert!(html.contains("Plotly.newPlot("));
        assert!(html.contains(r#""locations":["PRT","GBR"]"#));
        assert!(html.contains("Guests by country"));
        assert!(html.contains(PLOTLY_CDN));
    }

    #[test]
    fn script_breakouts_are_escaped() {
        let raw = r#"{"data":[{"name":"</script><b>x</b>"}]}"#;
        let html = render_plot_fragment(raw).unwrap();
        assert!(!html.contains("</script><b>"));
        assert!(html.contains("\\u003c/script\\u003e"));
    }

    #[test]
    fn invalid_plot_files_are_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let plot = dir.path().join("geo_distribution.json");

        fs::write(&plot, "not json").unwrap();
        assert!(collect_analytics(dir.path(), &plot).plot_html.is_none());

        fs::write(&plot, r#"{"layout":{}}"#).unwrap();
        assert!(collect_analytics(dir.path(), &plot).plot_html.is_none());

        fs::write(&plot, r#"{"data":[]}"#).unwrap();
        assert!(collect_analytics(dir.path(), &plot).plot_html.is_some());
    }
}
