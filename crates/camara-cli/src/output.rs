use std::io::Write;
use std::path::Path;

use camara_core::{SessionExtraction, VoteRecord};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print every vote record with its tally and roll call.
pub fn print_records(
    w: &mut dyn Write,
    file_name: &str,
    extraction: &SessionExtraction,
    color: ColorMode,
) -> std::io::Result<()> {
    let date = extraction.iter().find_map(|r| r.session_date());
    if color.enabled() {
        writeln!(w, "{} {}", "Votações em".bold(), file_name.bold().cyan())?;
    } else {
        writeln!(w, "Votações em {}", file_name)?;
    }
    if let Some(date) = date {
        writeln!(w, "Sessão de {}", date)?;
    }
    writeln!(w)?;

    if extraction.is_empty() {
        writeln!(w, "Nenhuma votação encontrada.")?;
        return Ok(());
    }

    for (i, record) in extraction.iter().enumerate() {
        print_record(w, i + 1, record, color)?;
        writeln!(w)?;
    }

    let total_votes: usize = extraction.iter().map(|r| r.member_votes().len()).sum();
    writeln!(
        w,
        "Total: {} votações, {} votos nominais",
        extraction.len(),
        total_votes
    )?;
    Ok(())
}

fn print_record(
    w: &mut dyn Write,
    number: usize,
    record: &VoteRecord,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(
            w,
            "{} {}",
            format!("[{}]", number).bold().yellow(),
            record.project_id().bold()
        )?;
        writeln!(w, "  Resultado: {}", colorize_outcome(record.outcome()))?;
    } else {
        writeln!(w, "[{}] {}", number, record.project_id())?;
        writeln!(w, "  Resultado: {}", record.outcome())?;
    }
    if let Some(subject) = record.subject() {
        writeln!(w, "  Objeto:    {}", subject)?;
    }
    if !record.related_projects().is_empty() {
        writeln!(w, "  Projetos:  {}", record.related_projects().join(", "))?;
    }
    if let Some(summary) = record.summary() {
        writeln!(w, "  Resumo:    {}", summary)?;
    }

    let tally = record.tally();
    if !tally.is_empty() {
        let parts: Vec<String> = tally
            .iter()
            .map(|(choice, n)| format!("{}: {}", choice, n))
            .collect();
        writeln!(w, "  Placar:    {}", parts.join(", "))?;
    }

    for vote in record.member_votes() {
        if color.enabled() {
            writeln!(
                w,
                "    {:<30} {}",
                vote.member(),
                colorize_choice(vote.choice())
            )?;
        } else {
            writeln!(w, "    {:<30} {}", vote.member(), vote.choice())?;
        }
    }
    Ok(())
}

fn colorize_outcome(outcome: &str) -> String {
    let lower = outcome.to_lowercase();
    if lower.starts_with("aprovad") {
        outcome.green().to_string()
    } else if lower.starts_with("rejeitad") {
        outcome.red().to_string()
    } else {
        outcome.to_string()
    }
}

fn colorize_choice(choice: &str) -> String {
    match choice.trim().to_lowercase().as_str() {
        "sim" | "favorável" | "favoravel" => choice.green().to_string(),
        "não" | "nao" | "contrário" | "contrario" => choice.red().to_string(),
        _ => choice.dimmed().to_string(),
    }
}

/// Write the records as a pretty-printed JSON array.
pub fn write_json(path: &Path, extraction: &SessionExtraction) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(extraction)?;
    std::fs::write(path, json + "\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SessionExtraction {
        serde_json::from_str(
            r#"[{"id_projeto":"PL 12/2025","resultado":"Aprovado por Unanimidade",
                "votos":[{"vereador":"Silva","voto":"Sim"},{"vereador":"Costa","voto":"Sim"}]}]"#,
        )
        .unwrap()
    }

    #[test]
    fn plain_output_lists_votes() {
        let mut buf = Vec::new();
        print_records(&mut buf, "ata.pdf", &sample(), ColorMode(false)).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("[1] PL 12/2025"));
        assert!(out.contains("Resultado: Aprovado por Unanimidade"));
        assert!(out.contains("Placar:    Sim: 2"));
        assert!(out.contains("Silva"));
        assert!(out.contains("Total: 1 votações, 2 votos nominais"));
    }

    #[test]
    fn plain_output_shows_details() {
        let extraction: SessionExtraction = serde_json::from_str(
            r#"[{"id_projeto":"PL 12/2025","data_votacao":"2025-07-22",
                "objeto_da_votacao":"Pedido de urgência","projetos_relacionados":["PL 12/2025","PDL 3/2025"],
                "resumo":"Reforma da praça.","resultado":"Aprovado","votos":[]}]"#,
        )
        .unwrap();
        let mut buf = Vec::new();
        print_records(&mut buf, "ata.pdf", &extraction, ColorMode(false)).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("Sessão de 2025-07-22"));
        assert!(out.contains("Objeto:    Pedido de urgência"));
        assert!(out.contains("Projetos:  PL 12/2025, PDL 3/2025"));
        assert!(out.contains("Resumo:    Reforma da praça."));
        assert!(!out.contains("Placar"));
    }

    #[test]
    fn empty_extraction_message() {
        let mut buf = Vec::new();
        print_records(&mut buf, "ata.pdf", &SessionExtraction::default(), ColorMode(false))
            .unwrap();
        assert!(String::from_utf8(buf).unwrap().contains("Nenhuma votação"));
    }

    #[test]
    fn json_file_keeps_accents_and_wire_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dados_votacoes.json");
        let extraction: SessionExtraction = serde_json::from_str(
            r#"[{"id_projeto":"PL 1","resultado":"Aprovado","votos":[{"vereador":"João","voto":"Não"}]}]"#,
        )
        .unwrap();
        write_json(&path, &extraction).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"vereador\": \"João\""));
        assert!(content.contains("\"voto\": \"Não\""));
        let back: SessionExtraction = serde_json::from_str(&content).unwrap();
        assert_eq!(back, extraction);
    }
}
