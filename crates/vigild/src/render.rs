//! CSV exports and the per-user history page.

use chrono::NaiveDateTime;
use vigil_core::Outcome;
use vigil_store::{EventRecord, IdentityRecord, TIMESTAMP_FORMAT};

pub const IDENTITIES_HEADER: [&str; 5] = ["ID", "Nombre", "Fecha Registro", "Último Acceso", "Activo"];
pub const EVENTS_HEADER: [&str; 6] = ["ID", "Usuario", "Tipo Acceso", "Fecha Acceso", "Similitud", "ID Usuario"];

/// Identities as CSV, one row per record in the given order.
pub fn identities_csv(rows: &[IdentityRecord]) -> Result<Vec<u8>, csv::Error> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(IDENTITIES_HEADER)?;
    for row in rows {
        wtr.write_record([
            row.id.to_string(),
            row.name.clone(),
            row.created_at.clone(),
            row.last_access.clone().unwrap_or_default(),
            u8::from(row.active).to_string(),
        ])?;
    }
    finish(wtr)
}

/// Events as CSV, one row per record in the given order.
pub fn events_csv(rows: &[EventRecord]) -> Result<Vec<u8>, csv::Error> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(EVENTS_HEADER)?;
    for row in rows {
        wtr.write_record([
            row.id.to_string(),
            row.declared_name.clone(),
            row.outcome.as_str().to_string(),
            row.occurred_at.clone(),
            row.similarity.to_string(),
            row.identity_id.map(|id| id.to_string()).unwrap_or_default(),
        ])?;
    }
    finish(wtr)
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, csv::Error> {
    wtr.into_inner().map_err(|e| csv::Error::from(e.into_error()))
}

/// Escape text for use in HTML element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Summary of a user's recent events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistorySummary {
    pub total: usize,
    pub admitted: usize,
    pub denied: usize,
    /// Admitted share in percent; 0 when there are no events.
    pub success_pct: f64,
}

impl HistorySummary {
    pub fn of(events: &[EventRecord]) -> Self {
        let total = events.len();
        let admitted = events.iter().filter(|e| e.outcome == Outcome::Admitted).count();
        let success_pct = if total == 0 {
            0.0
        } else {
            admitted as f64 / total as f64 * 100.0
        };
        Self {
            total,
            admitted,
            denied: total - admitted,
            success_pct,
        }
    }
}

fn display_time(stored: &str) -> String {
    NaiveDateTime::parse_from_str(stored, TIMESTAMP_FORMAT)
        .map(|t| t.format("%d/%m/%Y %H:%M:%S").to_string())
        .unwrap_or_else(|_| stored.to_string())
}

const PAGE_STYLE: &str = "body { font-family: Arial, sans-serif; margin: 20px; background: #f5f5f5; }
.container { background: white; padding: 30px; border-radius: 15px; max-width: 1000px; margin: 0 auto; }
.header { background: #3498db; color: white; padding: 20px; border-radius: 10px; text-align: center; }
table { width: 100%; border-collapse: collapse; margin-top: 20px; }
th, td { padding: 12px; text-align: left; border-bottom: 1px solid #ddd; }
th { background-color: #34495e; color: white; }
.admitted { color: #27ae60; font-weight: bold; }
.denied { color: #e74c3c; font-weight: bold; }
.stats { background: #f8f9fa; padding: 15px; border-radius: 10px; margin: 20px 0; }";

/// HTML page listing `events` (newest first) for `name`.
pub fn history_page(name: &str, events: &[EventRecord]) -> String {
    let name = escape_html(name);
    let mut html = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<title>Historial de {name}</title>\n\
         <style>\n{PAGE_STYLE}\n</style>\n</head>\n<body>\n<div class=\"container\">\n\
         <div class=\"header\">\n<h1>Historial de Accesos</h1>\n<h2>Usuario: {name}</h2>\n</div>\n"
    );

    if events.is_empty() {
        html.push_str("<p>No se encontraron accesos para este usuario.</p>\n");
    } else {
        let summary = HistorySummary::of(events);
        html.push_str(&format!(
            "<div class=\"stats\">\n<h3>Estadísticas</h3>\n\
             <p>Total de accesos: {}</p>\n<p>Accesos permitidos: {}</p>\n\
             <p>Accesos denegados: {}</p>\n<p>Porcentaje de éxito: {:.1}%</p>\n</div>\n",
            summary.total, summary.admitted, summary.denied, summary.success_pct
        ));
        html.push_str(
            "<table>\n<tr><th>Fecha/Hora</th><th>Tipo de Acceso</th><th>Nivel de Similitud</th></tr>\n",
        );
        for event in events {
            let class = match event.outcome {
                Outcome::Admitted => "admitted",
                Outcome::Denied => "denied",
            };
            html.push_str(&format!(
                "<tr><td>{}</td><td class=\"{class}\">{}</td><td>{:.1}%</td></tr>\n",
                escape_html(&display_time(&event.occurred_at)),
                event.outcome.as_str(),
                event.similarity * 100.0
            ));
        }
        html.push_str("</table>\n");
    }

    html.push_str("</div>\n</body>\n</html>\n");
    html
}
