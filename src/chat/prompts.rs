//! System prompt assembly.

use axum::http::HeaderMap;

const BASE_PROMPT: &str =
    "You are a friendly assistant! Keep your responses concise and helpful.";

const ARTIFACTS_PROMPT: &str = "\
Artifacts let you create documents the user sees beside the conversation. Use createDocument \
for substantial content (longer prose, code, or spreadsheets) the user will likely save or \
reuse, and updateDocument to revise a document you already created. Do not update a document \
immediately after creating it; wait for user feedback. For ordinary conversational answers, \
reply in chat without creating a document.";

const DATABASE_PROMPT: &str = "\
You can inspect the application database with the queryDatabase tool. Only SELECT statements \
are accepted; queries containing mutation keywords are rejected. Describe what each query \
retrieves in the description argument.";

/// Best-effort request geolocation, forwarded by the edge proxy.
#[derive(Debug, Clone, Default)]
pub struct RequestHints {
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl RequestHints {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            latitude: get("x-vercel-ip-latitude"),
            longitude: get("x-vercel-ip-longitude"),
            city: get("x-vercel-ip-city"),
            country: get("x-vercel-ip-country"),
        }
    }

    fn render(&self) -> Option<String> {
        if self.latitude.is_none()
            && self.longitude.is_none()
            && self.city.is_none()
            && self.country.is_none()
        {
            return None;
        }
        let unknown = || "unknown".to_string();
        Some(format!(
            "About the origin of the user's request:\n- lat: {}\n- lon: {}\n- city: {}\n- country: {}",
            self.latitude.clone().unwrap_or_else(unknown),
            self.longitude.clone().unwrap_or_else(unknown),
            self.city.clone().unwrap_or_else(unknown),
            self.country.clone().unwrap_or_else(unknown),
        ))
    }
}

/// Assemble the system prompt for a turn. Reasoning variants run
/// without tools, so the tool guidance is omitted for them.
pub fn system_prompt(hints: &RequestHints, with_tools: bool) -> String {
    let mut sections = vec![BASE_PROMPT.to_string()];
    if let Some(rendered) = hints.render() {
        sections.push(rendered);
    }
    if with_tools {
        sections.push(ARTIFACTS_PROMPT.to_string());
        sections.push(DATABASE_PROMPT.to_string());
    }
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasoning_prompt_omits_tool_guidance() {
        let prompt = system_prompt(&RequestHints::default(), false);
        assert!(prompt.contains("friendly assistant"));
        assert!(!prompt.contains("queryDatabase"));
    }

    #[test]
    fn test_tool_prompt_includes_guidance() {
        let prompt = system_prompt(&RequestHints::default(), true);
        assert!(prompt.contains("createDocument"));
        assert!(prompt.contains("queryDatabase"));
    }

    #[test]
    fn test_hints_rendered_when_present() {
        let hints = RequestHints {
            city: Some("Lisbon".into()),
            ..Default::default()
        };
        let prompt = system_prompt(&hints, true);
        assert!(prompt.contains("Lisbon"));
        assert!(prompt.contains("lat: unknown"));
    }

    #[test]
    fn test_hints_read_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-vercel-ip-city", "Porto".parse().unwrap());
        let hints = RequestHints::from_headers(&headers);
        assert_eq!(hints.city.as_deref(), Some("Porto"));
        assert!(hints.latitude.is_none());
    }
}
