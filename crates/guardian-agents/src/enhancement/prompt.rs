//! Prompt construction for the enhancement engine

use guardian_core::Finding;

/// Prefix of `content` holding at most `max_chars` characters.
/// Content at or under the limit is returned unchanged.
pub fn truncate_chars(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &content[..byte_idx],
        None => content,
    }
}

/// One line per finding: `- Line N: Type - description [Severity: S]`
pub fn finding_summaries(findings: &[Finding]) -> String {
    findings
        .iter()
        .map(|f| {
            format!(
                "- Line {}: {} - {} [Severity: {}]",
                f.line_number, f.violation_type, f.description, f.severity
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Per-file analysis prompt. `content` is expected to be truncated already.
pub fn file_prompt(file_path: &str, content: &str, findings: &[Finding], max_chars: usize) -> String {
    format!(
        r#"
You are an expert privacy compliance analyst with deep knowledge of GDPR, CCPA, HIPAA, and other privacy regulations.

File: {file_path}
Content (first {max_chars} characters):
{content}

Detected violations:
{violations}

Please provide a comprehensive privacy analysis including:

1. **Enhanced Violation Analysis**: For each detected violation:
   - Detailed explanation of the privacy risk
   - Specific regulatory violations (GDPR articles, CCPA sections, etc.)
   - Business impact assessment
   - Enhanced fix suggestions with code examples
   - Related privacy concerns

2. **Additional Violations**: Identify any related privacy issues not yet detected:
   - Missing consent mechanisms
   - Data retention violations
   - Security vulnerabilities
   - Privacy by design violations

3. **Context Analysis**: How these violations relate to:
   - Overall application architecture
   - Data flow patterns
   - User privacy rights
   - Compliance requirements

Format your response as JSON:
{{
    "enhanced_violations": [
        {{
            "line_number": <line>,
            "enhanced_description": "<detailed explanation with context>",
            "risk_assessment": "<HIGH/MEDIUM/LOW>",
            "business_impact": "<specific business consequences>",
            "enhanced_fix": "<detailed code fix with explanation>",
            "regulatory_articles": ["<specific GDPR Article X>", "<CCPA Section Y>"],
            "related_concerns": ["<related privacy issue 1>", "<related privacy issue 2>"],
            "compliance_priority": "<IMMEDIATE/HIGH/MEDIUM/LOW>"
        }}
    ],
    "additional_violations": [
        {{
            "line_number": <line>,
            "violation_type": "<specific violation type>",
            "description": "<detailed description>",
            "severity": "<HIGH/MEDIUM/LOW>",
            "fix_suggestion": "<specific fix with code>",
            "regulation_reference": "<specific regulation>",
            "compliance_impact": "<HIGH/MEDIUM/LOW>"
        }}
    ],
    "context_analysis": {{
        "overall_risk_level": "<HIGH/MEDIUM/LOW>",
        "compliance_gaps": ["<gap 1>", "<gap 2>"],
        "architectural_concerns": ["<concern 1>", "<concern 2>"],
        "recommendations": ["<recommendation 1>", "<recommendation 2>"]
    }}
}}

Focus on actionable insights that help developers understand the full scope of privacy implications and implement effective fixes.
"#,
        file_path = file_path,
        max_chars = max_chars,
        content = content,
        violations = finding_summaries(findings),
    )
}

/// Violation types with counts, in order of first appearance
pub fn violation_type_counts(findings: &[Finding]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for finding in findings {
        match counts.iter_mut().find(|(t, _)| *t == finding.violation_type) {
            Some((_, n)) => *n += 1,
            None => counts.push((finding.violation_type.clone(), 1)),
        }
    }
    counts
}

/// Prompt for the aggregate insight pass over the whole run
pub fn insight_prompt(original_count: usize, enhanced: &[Finding]) -> String {
    let type_summary = violation_type_counts(enhanced)
        .iter()
        .map(|(t, n)| format!("- {}: {}", t, n))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"
You are analyzing the results of a comprehensive privacy compliance scan.

Original violations found: {original_count}
Enhanced violations after AI analysis: {enhanced_count}

Violation types detected:
{type_summary}

Please provide comprehensive insights including:

1. **Overall Assessment**: Summary of privacy posture
2. **Critical Issues**: Most urgent privacy concerns
3. **Compliance Gaps**: Missing privacy controls
4. **Risk Prioritization**: Which issues to address first
5. **Strategic Recommendations**: Long-term privacy improvements

Format as JSON:
{{
    "overall_assessment": {{
        "privacy_posture": "<EXCELLENT/GOOD/FAIR/POOR>",
        "compliance_status": "<COMPLIANT/PARTIALLY_COMPLIANT/NON_COMPLIANT>",
        "risk_level": "<HIGH/MEDIUM/LOW>"
    }},
    "critical_issues": [
        {{
            "issue": "<description>",
            "impact": "<business/legal/user impact>",
            "urgency": "<IMMEDIATE/HIGH/MEDIUM>"
        }}
    ],
    "compliance_gaps": [
        "<specific gap description>"
    ],
    "risk_prioritization": [
        {{
            "priority": "<1/2/3>",
            "violation_types": ["<types>"],
            "rationale": "<why this priority>"
        }}
    ],
    "strategic_recommendations": [
        {{
            "recommendation": "<description>",
            "timeline": "<short/medium/long term>",
            "impact": "<expected outcome>"
        }}
    ]
}}
"#,
        original_count = original_count,
        enhanced_count = enhanced.len(),
        type_summary = type_summary,
    )
}
