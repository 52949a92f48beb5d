use extract::CatalogProduct;
use serde::Serialize;
use serde_json::Value;

use crate::policy::BLOCKING_SCORE_CAP;
use crate::schema::MatchingInput;

/// PDF text beyond this many characters is left out of the matching prompt.
pub const MATCHING_PDF_CHARS: usize = 2000;

#[derive(Serialize)]
struct ProductView<'a> {
    id: &'a str,
    nome: &'a str,
    categoria: &'a str,
    descricao_curta: Option<&'a str>,
    aplicacao: Option<&'a str>,
    observacoes: Option<&'a str>,
    especificacoes_tecnicas: &'a Value,
    pdf_text: Option<String>,
}

impl<'a> ProductView<'a> {
    fn new(product: &'a CatalogProduct) -> Self {
        Self {
            id: &product.id,
            nome: &product.nome,
            categoria: &product.categoria,
            descricao_curta: product.descricao_curta.as_deref(),
            aplicacao: product.aplicacao.as_deref(),
            observacoes: product.observacoes.as_deref(),
            especificacoes_tecnicas: &product.especificacoes_tecnicas,
            pdf_text: product.pdf_excerpt(MATCHING_PDF_CHARS),
        }
    }
}

pub fn build_matching_prompt(input: &MatchingInput) -> Result<String, serde_json::Error> {
    let requirements_json = serde_json::to_string_pretty(&input.requirements)?;
    let products: Vec<ProductView<'_>> = input.products.iter().map(ProductView::new).collect();
    let products_json = serde_json::to_string_pretty(&products)?;
    let cap = BLOCKING_SCORE_CAP;

    Ok(format!(
        r#"You are a biomedical engineering analyst working on public procurement of hospital equipment.

Match the tender requirements below against the company's product catalog.

RULES:
- Use ONLY products that appear in the catalog input
- Use ONLY specifications stated in the product data or PDF text
- A requirement that is not clearly met is NOT_COMPLIANT
- Missing information means NOT_COMPLIANT; never assume or invent specifications
- Prefer the smallest number of products that satisfies every mandatory requirement
- If no product complies, say so plainly

TENDER REQUIREMENTS:
{requirements_json}

PRODUCT CATALOG:
{products_json}

PROCEDURE:
1. For each requirement, identify the condition to satisfy and whether it is mandatory.
2. For each product, classify every requirement as "COMPLIANT", "PARTIALLY_COMPLIANT" or "NOT_COMPLIANT".
3. Score each product from 0 to 100. Mandatory requirements weigh more. A product that
   misses any mandatory requirement scores {cap} or less and lists the gap in blocking_issues.
4. Select the single best product, or the minimal set of products that together meet all
   mandatory requirements. If no valid selection exists, set best_match to null and explain why.

OUTPUT RULES:
- Output ONLY the JSON object: first character {{, last character }}
- No markdown, no code fences, no commentary
- Double quotes for every string, no trailing commas

SCHEMA:
{{
  "best_match": {{
    "product_ids": ["catalog id"],
    "product_names": ["catalog name"],
    "compliance_score": 95,
    "justification": "technical justification"
  }},
  "requirement_analysis": [
    {{
      "requirement_id": "REQ-01",
      "title": "requirement title",
      "mandatory": true,
      "results": [
        {{"product_id": "catalog id", "status": "COMPLIANT", "evidence": "where the spec says so"}}
      ]
    }}
  ],
  "all_products_evaluated": [
    {{"product_id": "catalog id", "product_name": "catalog name", "compliance_score": 85, "blocking_issues": []}}
  ],
  "final_verdict": {{"fully_compliant": true, "notes": "final notes"}}
}}

When no product meets every mandatory requirement: "best_match": null and "fully_compliant": false.

JSON OUTPUT:"#
    ))
}
