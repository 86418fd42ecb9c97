//! Prompt composition for template generation.

use crate::DiscoveredUrl;

pub const SYSTEM_INSTRUCTION: &str = "You are a security expert who writes Nuclei \
vulnerability verification templates. Produce one valid template from the supplied \
information, following the YAML template shape given in the request exactly. Mind \
indentation and quoting so the template loads and runs in Nuclei unchanged.";

pub const URL_SECTION_HEADER: &str = "Reference URLs:";
pub const OUTPUT_FORMAT_MARKER: &str = "Output format:";
pub const COLLECTED_HEADER: &str = "Collected information:";

pub const DEFAULT_PROMPT: &str = r#"Analyse the following information about a security vulnerability and write a Nuclei POC (proof of concept) template that verifies it.

Output format:

```yaml
id: {{vulnerability id or CVE id}}

info:
  name: {{vulnerability name}} {{affected version, if known}} - {{vulnerability class}}
  author: pocforge
  severity: {{critical/high/medium/low/info}}
  description: |
    {{detailed description: affected versions, root cause}}
  reference:
    - {{reference link 1}}
    - {{reference link 2}}
  classification:
    cvss-metrics: {{CVSS vector, e.g. CVSS:3.1/AV:N/AC:L/PR:L/UI:N/S:U/C:L/I:L/A:L}}
    cvss-score: {{CVSS score, e.g. 6.3}}
    cve-id: {{CVE id, if any}}
  metadata:
    fofa-query: {{FOFA query}}
    google-query: {{Google dork}}
    shodan-query: {{Shodan query}}
  tags: {{comma separated tags}}

http:
  - method: {{GET/POST/PUT...}}
    path:
      - "{{BaseURL}}{{URI path}}"

    # optional request headers
    headers:
      {{header name}}: {{header value}}

    # optional request body
    body: |
      {{request body}}

    # optional extractors
    extractors:
      - type: regex
        name: version
        part: body
        group: 1
        regex:
          - "{{pattern}}"

    matchers-condition: and
    matchers:
      - type: status
        status:
          - {{status code, e.g. 200}}

      - type: word
        words:
          - "{{keyword 1}}"
          - "{{keyword 2}}"
        part: body
        condition: and

      # optional
      - type: regex
        regex:
          - "{{pattern}}"
        part: body

      # optional
      - type: dsl
        dsl:
          - "{{DSL expression, e.g. a version check}}"
```

Make sure that:
1. Every required field is filled from the collected CVE information, especially the request path, parameters and response signatures.
2. The output is strictly valid YAML; watch indentation and quoting.
3. The matchers reliably decide whether the vulnerability is present.
4. Accurate FOFA, Google or Shodan queries are given to locate potentially affected targets.
5. Nothing is written outside the template.

The complete output must be a POC that can be saved as a .yaml file and executed by the Nuclei engine as-is.
"#;

/// Adds a numbered reference-URL section to `prompt`.
///
/// The section goes in front of the output-format marker when there is one,
/// otherwise at the end. Prompts that already carry the section are returned
/// unchanged, as are prompts when there are no URLs.
pub fn with_reference_urls(prompt: &str, urls: &[DiscoveredUrl]) -> String {
    if urls.is_empty() || prompt.contains(URL_SECTION_HEADER) {
        return prompt.to_string();
    }

    let mut section = format!("\n\n{URL_SECTION_HEADER}\n");
    for (i, url) in urls.iter().enumerate() {
        section.push_str(&format!("{}. {}\n", i + 1, url.url));
    }

    match prompt.split_once(OUTPUT_FORMAT_MARKER) {
        Some((head, tail)) => format!("{head}{section}\n{OUTPUT_FORMAT_MARKER}{tail}"),
        None => format!("{prompt}{section}"),
    }
}

/// User message for the model: the prompt followed by the collected evidence.
pub fn compose_user_content(prompt: &str, collected: &str) -> String {
    format!("{}\n\n{COLLECTED_HEADER}\n\n{collected}", prompt.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls() -> Vec<DiscoveredUrl> {
        vec![
            DiscoveredUrl::new("https://a.example/1", "vulndb"),
            DiscoveredUrl::new("https://github.com/x/poc", "web-search"),
        ]
    }

    #[test]
    fn url_section_goes_before_output_format() {
        let prompt = "Intro\n\nOutput format:\nBODY";
        let composed = with_reference_urls(prompt, &urls());
        assert_eq!(
            composed,
            "Intro\n\n\nReference URLs:\n1. https://a.example/1\n2. https://github.com/x/poc\n\nOutput format:\nBODY"
        );
    }

    #[test]
    fn url_section_is_appended_without_marker_and_added_once() {
        let composed = with_reference_urls("Plain prompt", &urls());
        assert!(composed.starts_with("Plain prompt\n\nReference URLs:\n1. "));
        assert_eq!(with_reference_urls(&composed, &urls()), composed);
    }

    #[test]
    fn no_urls_leaves_prompt_alone() {
        assert_eq!(with_reference_urls(DEFAULT_PROMPT, &[]), DEFAULT_PROMPT);
    }

    #[test]
    fn user_content_appends_collected_block() {
        assert_eq!(
            compose_user_content("  P \n", "evidence"),
            "P\n\nCollected information:\n\nevidence"
        );
    }
}
