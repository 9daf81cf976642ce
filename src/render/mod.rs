use tera::{Context, Tera};

use crate::artifacts::ArtifactStore;
use crate::error::PushError;
use crate::models::InfraModel;

/// Renderer turns a template name plus a data binding into configuration text
pub struct Renderer {
    tera: Tera,
}

impl Renderer {
    /// Load every template under `dir`; templates are addressed by their path
    /// relative to `dir` (e.g. "interfaces.j2", "ios/ospf.j2")
    pub fn from_dir(dir: &str) -> Result<Self, PushError> {
        let glob = format!("{}/**/*", dir.trim_end_matches('/'));
        let tera = Tera::new(&glob).map_err(|e| PushError::Templates {
            dir: dir.to_string(),
            reason: error_chain(&e),
        })?;
        tracing::debug!("Loaded {} templates from {}", tera.get_template_names().count(), dir);
        Ok(Self { tera })
    }

    /// Build a renderer from in-memory `(name, content)` pairs
    pub fn from_raw(templates: &[(&str, &str)]) -> Result<Self, PushError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(templates.iter().copied())
            .map_err(|e| PushError::Templates {
                dir: "<inline>".to_string(),
                reason: error_chain(&e),
            })?;
        Ok(Self { tera })
    }

    /// Render one template against a JSON object binding
    pub fn render(&self, template_name: &str, data: &serde_json::Value) -> tera::Result<String> {
        let context = Context::from_serialize(data)?;
        self.tera.render(template_name, &context)
    }
}

/// Render every ConfigSpec of every device into the store, in model order.
/// The store is fully populated before this returns; the first failure aborts the run.
pub fn render_all(
    model: &InfraModel,
    renderer: &Renderer,
    store: &mut ArtifactStore,
) -> Result<usize, PushError> {
    let mut count = 0;

    for device in &model.devices {
        for spec in &device.config_spec {
            let binding = device.binding(spec)?;
            let text = renderer
                .render(&spec.template, &binding)
                .map_err(|e| PushError::Render {
                    hostname: device.hostname.clone(),
                    template: spec.template.clone(),
                    reason: error_chain(&e),
                })?;

            let artifact = store.write(&device.hostname, &spec.config_file, &text)?;
            tracing::info!(
                "Created config file '{}' from template '{}' for device '{}'",
                artifact.name,
                spec.template,
                device.hostname
            );
            count += 1;
        }
        tracing::info!("Config files for {} created", device.hostname);
    }

    Ok(count)
}

/// Tera nests the useful message in the error source chain
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
