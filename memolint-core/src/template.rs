use crate::types::{OpinionLevel, SectionKind};
use std::fmt::Write as _;

/// Blank memo skeletons in house style.
pub struct MemoTemplate;

impl MemoTemplate {
    /// A memo with every canonical heading, the three-block Red-Team
    /// scaffold and the opinion-level legend. `date` defaults to today.
    pub fn blank_memo(matter: &str, question: &str, author: Option<&str>, date: Option<&str>) -> String {
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        let date = date.unwrap_or(&today);
        let author = author.unwrap_or("[Author]");

        let mut memo = String::new();
        let _ = writeln!(memo, "# International Tax Memo: {matter}\n");
        let _ = writeln!(memo, "**Date:** {date}");
        let _ = writeln!(memo, "**Prepared by:** {author}");
        let _ = writeln!(memo, "**Matter:** {matter}\n");

        for kind in SectionKind::ALL {
            let _ = writeln!(memo, "## {}\n", heading(kind));
            memo.push_str(&body(kind, question));
            memo.push('\n');
        }

        memo.push_str("*This memo is attorney work product prepared for internal use. Confidential and privileged.*\n");
        memo
    }

    /// The research plan drafted before the memo. Given facts replace the
    /// facts placeholder and given jurisdictions replace the regimes line.
    pub fn research_plan(request: &PlanRequest<'_>) -> String {
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        let date = request.date.unwrap_or(&today);
        let matter = request.matter;
        let question = request.question;
        let regimes = if request.jurisdictions.is_empty() {
            "[US Subpart F/GILTI; OECD Pillar Two; Treaty X-Y; Country A/B]".to_string()
        } else {
            request.jurisdictions.join("; ")
        };

        let mut plan = String::new();
        let _ = writeln!(plan, "# Research Plan: {matter}\n");
        let _ = writeln!(plan, "**Date:** {date}");
        let _ = writeln!(plan, "**Question:** {question}\n");

        let _ = writeln!(plan, "## 1) Matter Snapshot\n");
        let _ = writeln!(plan, "- **Short Title:** {matter}");
        let _ = writeln!(plan, "- **Question to Answer:** {question}");
        let _ = writeln!(plan, "- **Jurisdictions / Regimes:** {regimes}");
        plan.push_str("- **Time Period / Tax Years:** [Specify]\n");
        plan.push_str("- **Deliverable:** Executive answer + practitioner memo\n");
        plan.push_str("- **Deadline:** [Date]\n\n");

        plan.push_str("## 2) Facts (Sanitized)\n\n");
        match request.facts.map(str::trim).filter(|facts| !facts.is_empty()) {
            Some(facts) => {
                let _ = writeln!(plan, "{facts}\n");
            }
            None => plan.push_str("[3-10 bullets of essential facts. Mask identifiers.]\n\n-\n-\n-\n\n"),
        }

        plan.push_str("## 3) Issues & Sub-Issues\n\n");
        for n in 1..=3 {
            let _ = writeln!(plan, "{n}. **[Sub-issue #{n}]**\n   - Hypothesis / what would prove or refute:\n");
        }

        plan.push_str(concat!(
            "## 4) Authorities to Consult\n\n",
            "### 4.1 U.S. Primary\n\n",
            "- **IRC:** § [section]\n- **Treasury Regulations:** § [regulation]\n",
            "- **IRS Guidance:** Notice [number]; Rev. Rul. [number]\n",
            "- **Cases:** [Bluebook cites with pincites]\n\n",
            "### 4.2 OECD / Pillar Two\n\n",
            "- **Model Convention:** Art. [number], Commentary ¶ [number]\n",
            "- **Administrative Guidance:** § [section] ([Month YYYY] update)\n\n",
            "### 4.3 Treaties & Technical Explanations\n\n",
            "- **Treaty (X-Y):** Art. [number], LOB provisions\n",
            "- **Technical Explanation:** pages [number]\n\n",
            "### 4.4 Local Law\n\n",
            "- **Statutes:** [citation]\n- **Regulations:** [citation]\n- **Official translations:** [Yes/No]\n\n",
            "### 4.5 Secondary (label as secondary)\n\n",
            "- [Firm memos] (secondary)\n- [Treatises / journals] (secondary)\n\n",
            "## 5) Search Strategy & Source Locations\n\n",
            "- IRS.gov: [specific pages]\n- OECD.org: [specific pages]\n",
            "- `memolint search-irs \"[term]\"` and `memolint search-oecd \"[term]\"`\n",
            "- Case law: [public sources; Shepardize before relying]\n\n",
            "## 6) Expected Deliverables & Exhibits\n\n",
            "- [ ] Treaty LOB/BO table\n- [ ] PE risk grid\n- [ ] Withholding rate matrix\n- [ ] Other: [specify]\n\n",
            "## 7) Assumptions, Unknowns, Data Requests\n\n",
            "### Assumptions\n\n1.\n2.\n\n",
            "### Unknowns / Clarifications Needed\n\n1.\n2.\n\n",
            "### Data / Documents to Request\n\n- Contracts\n- Org charts\n- Payment logs\n- TP documentation\n\n",
        ));

        plan.push_str("## 8) Risk Forecast (Early View)\n\n");
        let levels: Vec<&str> = OpinionLevel::ALL.iter().map(|level| level.label()).collect();
        let _ = writeln!(plan, "- **Sub-issue #1:** [{}] (tentative)", levels.join(" / "));
        plan.push_str("- **Overall:** [Level] (tentative)\n\n");
        plan.push_str("**Penalty shield needed:** [Yes if the overall level is More likely than not or Should]\n\n");

        plan.push_str("## 9) Plan Approval\n\n- **Reviewer:** [Name]\n- **Date:** [Date]\n- **Decision:** [Approved / Revise]\n");
        plan
    }
}

/// Inputs for `MemoTemplate::research_plan`.
#[derive(Debug, Clone, Default)]
pub struct PlanRequest<'a> {
    pub matter: &'a str,
    pub question: &'a str,
    pub jurisdictions: &'a [String],
    /// Sanitized facts, pasted in verbatim
    pub facts: Option<&'a str>,
    /// Defaults to today
    pub date: Option<&'a str>,
}

fn heading(kind: SectionKind) -> &'static str {
    match kind {
        SectionKind::Facts => "Facts (Sanitized)",
        SectionKind::RedTeam => "Red-Team (Counter-Arguments)",
        SectionKind::FollowUps => "Follow-Ups & Assumptions",
        SectionKind::Exhibits => "Exhibits / Evidence List",
        other => other.canonical_name(),
    }
}

fn body(kind: SectionKind, question: &str) -> String {
    match kind {
        SectionKind::ExecutiveAnswer => "[Bottom-line answer in 150 words or fewer. Conclusion first, then the key supporting points.]\n".to_string(),
        SectionKind::IssuePresented => format!("{question}\n"),
        SectionKind::Facts => "[Essential facts only. Use placeholders such as [Client Entity A], [Amount], [Date].]\n\n-\n-\n-\n".to_string(),
        SectionKind::LawAndAuthorities => concat!(
            "[Primary sources first, with pincites.]\n\n",
            "### U.S. Statutes & Regulations\n\n- IRC § [section]([subsection])\n- Treas. Reg. § [regulation]\n\n",
            "### IRS Guidance\n\n- Notice [number], [year]-[number] I.R.B. [page]\n- Rev. Rul. [number], [year]-[number] I.R.B. [page]\n\n",
            "### Cases\n\n- [Case Name], [Volume] [Reporter] [Page], [Pincite] ([Court] [Year])\n\n",
            "### Treaties\n\n- [Treaty name], Art. [number]\n\n",
            "### OECD Guidance\n\n- OECD Model Tax Convention, Art. [number], Commentary ¶ [number]\n\n",
            "### Secondary Sources\n\n- [Source] (secondary)\n",
        )
        .to_string(),
        SectionKind::Analysis => "[Apply the law to the facts, one sub-issue at a time.]\n\n### Sub-Issue 1: [Title]\n\n[Analysis with citations]\n".to_string(),
        SectionKind::Conclusion => {
            let mut text = "On balance, we assess [Opinion Level] that [restate conclusion].\n\nOpinion levels:\n".to_string();
            for level in OpinionLevel::ALL {
                let _ = writeln!(text, "- {}{}", level.label(), legend(level));
            }
            text
        }
        SectionKind::RedTeam => {
            let mut text = "[Three strongest counter-arguments.]\n".to_string();
            for n in 1..=3 {
                let _ = write!(
                    text,
                    "\n### {n}. [Counter-Argument Title]\n\n**Thesis:** [Brief description]\n\n**Authority:** [Citation]\n\n**Likelihood:** [Low/Medium/High]\n\n**Mitigation:** [How to address]\n"
                );
            }
            text
        }
        SectionKind::RiskAndPenaltyShield => "[Required when the opinion level is More likely than not or Should; remove otherwise.]\n".to_string(),
        SectionKind::FollowUps => "### Assumptions\n\n1.\n\n### Follow-Up Questions\n\n1.\n".to_string(),
        SectionKind::Exhibits => "- **Ex. A**: [Description] (accessed [Date])\n".to_string(),
    }
}

fn legend(level: OpinionLevel) -> &'static str {
    match level {
        OpinionLevel::ReasonableAuthority => " (~20-30%): non-frivolous basis in law",
        OpinionLevel::SubstantialAuthority => " (~35-45%): substantial weight of authorities",
        OpinionLevel::MoreLikelyThanNot => " (>50%): likely to be sustained",
        OpinionLevel::Should => " (~70-80%): high confidence",
    }
}
