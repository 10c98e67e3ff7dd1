use std::path::Path;

/// Values substituted into command templates.
#[derive(Debug, Default)]
pub struct TemplateVars<'a> {
    pub regression_path: Option<&'a Path>,
    pub workdir: Option<&'a Path>,
    pub chip: Option<&'a str>,
    pub model: Option<&'a str>,
    pub mode: Option<&'a str>,
}

impl TemplateVars<'_> {
    /// Replace every known `{placeholder}` in `template`. Unknown or unset placeholders are left
    /// as they are.
    pub fn expand(&self, template: &str) -> String {
        let mut expanded = template.to_string();
        let mut replace = |key: &str, value: &str| {
            expanded = expanded.replace(&format!("{{{key}}}"), value);
        };

        if let Some(path) = self.regression_path {
            replace("regression_path", &path.to_string_lossy());
        }
        if let Some(path) = self.workdir {
            replace("workdir", &path.to_string_lossy());
        }
        if let Some(chip) = self.chip {
            replace("chip", chip);
        }
        if let Some(model) = self.model {
            replace("model", model);
        }
        if let Some(mode) = self.mode {
            replace("mode", mode);
        }

        expanded
    }

    pub fn expand_all(&self, templates: &[String]) -> Vec<String> {
        templates.iter().map(|t| self.expand(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn expands_known_placeholders() {
        let vars = TemplateVars {
            regression_path: Some(Path::new("/work/regression")),
            chip: Some("bm1684x"),
            model: Some("resnet50_v2"),
            mode: Some("basic"),
            ..Default::default()
        };

        assert_eq!(
            vec![
                "/work/regression/run_model.py",
                "resnet50_v2",
                "--chip=bm1684x",
                "basic"
            ],
            vars.expand_all(&[
                "{regression_path}/run_model.py".to_string(),
                "{model}".to_string(),
                "--chip={chip}".to_string(),
                "{mode}".to_string(),
            ])
        );
    }

    #[test]
    fn unset_placeholders_are_kept() {
        let vars = TemplateVars {
            chip: Some("cv183x"),
            ..Default::default()
        };

        assert_eq!("{model}_cv183x", vars.expand("{model}_{chip}"));
    }
}
