use crate::schema::AnalysisInput;

pub fn build_analysis_prompt(input: &AnalysisInput) -> String {
    let context = match input.context.as_deref() {
        Some(context) if !context.trim().is_empty() => {
            format!("ADDITIONAL CONTEXT:\n{context}\n")
        }
        _ => String::new(),
    };

    format!(
        r#"You are a technical analyst reviewing a public tender (edital) for medical equipment.

Assess the tender below and answer with a structured evaluation.

EDITAL NAME: {name}

EDITAL CONTENT:
{text}

{context}
TASKS:
1. Summarize the technical requirements
2. Decide whether the requirements are clear and verifiable
3. Point out compliance problems
4. Give practical recommendations

OUTPUT RULES:
- Output ONLY the JSON object, no markdown, no code fences
- No text before or after the JSON
- Double quotes for every string, no trailing commas

SCHEMA:
{{
  "summary": "short technical summary",
  "compliance": true,
  "recommendations": ["practical recommendation"]
}}

"compliance" is true only when the requirements are clear and verifiable.

JSON OUTPUT:"#,
        name = input.edital_name,
        text = input.edital_text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(context: Option<&str>) -> AnalysisInput {
        AnalysisInput {
            edital_text: "Aquisição de monitor multiparamétrico".into(),
            edital_name: "PE 12/2025".into(),
            context: context.map(str::to_string),
        }
    }

    #[test]
    fn prompt_embeds_name_and_text() {
        let prompt = build_analysis_prompt(&input(None));
        assert!(prompt.contains("EDITAL NAME: PE 12/2025"));
        assert!(prompt.contains("monitor multiparamétrico"));
        assert!(!prompt.contains("ADDITIONAL CONTEXT"));
    }

    #[test]
    fn context_section_only_when_present() {
        let prompt = build_analysis_prompt(&input(Some("Hospital regional")));
        assert!(prompt.contains("ADDITIONAL CONTEXT:\nHospital regional"));
    }
}
