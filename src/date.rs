//! Interpretação flexível de datas (formatos brasileiros, data serial do Excel e ISO)
//! e aritmética de dias úteis.
//!
//! Todas as funções são puras: entradas inválidas resultam em `None`, nunca em erro.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Weekday};

use crate::{RE_ISO_PREFIX, RE_NUMERO};

const MILISSEGUNDOS_POR_DIA: f64 = 86_400_000.0;

/// Formatos tentados no fallback genérico (equivalente ao parser nativo de datas).
const FORMATOS_NATIVOS: [&str; 7] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Interpreta uma data em um dos formatos conhecidos.
///
/// Ordem das tentativas:
/// 1. `dd/mm/yyyy[ hh:mm[:ss]]`
/// 2. `dd-mm-yyyy[ hh:mm[:ss]]` (apenas quando a string não começa com `yyyy-mm-dd`)
/// 3. Data serial do Excel: número estritamente entre 1000 e 100000
/// 4. Fallback genérico (ISO 8601, RFC 3339, `yyyy/mm/dd`)
///
/// Datas impossíveis no calendário (como `31/02/2024`) não são ajustadas
/// para o mês seguinte: resultam em `None`.
///
/// ```
/// use analise_ocorrencias::parse_flexible_date;
/// use chrono::{Datelike, NaiveDate};
///
/// let d = parse_flexible_date("31/12/2024 14:35").unwrap();
/// assert_eq!(d.date(), NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
///
/// let serial = parse_flexible_date("45292").unwrap();
/// assert_eq!(serial.date(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
///
/// assert!(parse_flexible_date("not a date").is_none());
/// assert!(parse_flexible_date("31/02/2024").is_none());
/// ```
pub fn parse_flexible_date(input: &str) -> Option<NaiveDateTime> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    if s.contains('/')
        && let Some(d) = parse_dia_mes_ano(s, '/')
    {
        return Some(d);
    }

    if s.contains('-')
        && !RE_ISO_PREFIX.is_match(s)
        && let Some(d) = parse_dia_mes_ano(s, '-')
    {
        return Some(d);
    }

    if RE_NUMERO.is_match(s)
        && let Ok(num) = s.parse::<f64>()
        && num > 1000.0
        && num < 100_000.0
    {
        return data_serial_excel(num);
    }

    parse_nativo(s)
}

/// Parte de data `dd<sep>mm<sep>yyyy` seguida, opcionalmente, de `hh:mm[:ss]`.
fn parse_dia_mes_ano(s: &str, sep: char) -> Option<NaiveDateTime> {
    let mut partes = s.splitn(2, ' ');
    let parte_data = partes.next()?;
    let parte_hora = partes.next().map(str::trim).filter(|h| !h.is_empty());

    let componentes: Vec<&str> = parte_data.split(sep).collect();
    if componentes.len() != 3 {
        return None;
    }

    let numeros: Vec<u32> = componentes
        .iter()
        .map(|c| c.trim().parse::<u32>().ok())
        .collect::<Option<Vec<u32>>>()?;

    let (dd, mm, yyyy) = (numeros[0], numeros[1], numeros[2]);
    let data = NaiveDate::from_ymd_opt(i32::try_from(yyyy).ok()?, mm, dd)?;

    let hora = match parte_hora {
        Some(h) => parse_hora(h)?,
        None => NaiveTime::MIN,
    };

    Some(data.and_time(hora))
}

/// `hh[:mm[:ss]]`; componentes ilegíveis valem zero.
fn parse_hora(h: &str) -> Option<NaiveTime> {
    let mut campos = h.split(':').map(|v| v.trim().parse::<u32>().unwrap_or(0));
    let hh = campos.next().unwrap_or(0);
    let mi = campos.next().unwrap_or(0);
    let ss = campos.next().unwrap_or(0);
    NaiveTime::from_hms_opt(hh, mi, ss)
}

/// Dias desde 1899-12-30: época de 1900-01-01 menos 2 dias
/// (o Excel considera 1900 bissexto).
pub fn data_serial_excel(num: f64) -> Option<NaiveDateTime> {
    let epoca = NaiveDate::from_ymd_opt(1900, 1, 1)?.and_time(NaiveTime::MIN);
    let dias = num - 2.0;
    let delta = TimeDelta::try_milliseconds((dias * MILISSEGUNDOS_POR_DIA).round() as i64)?;
    epoca.checked_add_signed(delta)
}

fn parse_nativo(s: &str) -> Option<NaiveDateTime> {
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d.and_time(NaiveTime::MIN));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y/%m/%d") {
        return Some(d.and_time(NaiveTime::MIN));
    }
    if let Some(d) = FORMATOS_NATIVOS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        return Some(d);
    }
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_rfc2822(s))
        .map(|d| d.naive_local())
        .ok()
}

pub fn eh_fim_de_semana(data: NaiveDate) -> bool {
    matches!(data.weekday(), Weekday::Sat | Weekday::Sun)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContagemDias {
    pub dias_uteis: u32,
    pub fins_de_semana: u32,
}

/// Conta dias úteis e dias de fim de semana no intervalo fechado `[a, b]`.
/// A ordem dos argumentos é indiferente.
pub fn calcular_dias_uteis(a: NaiveDate, b: NaiveDate) -> ContagemDias {
    let (inicio, fim) = if a > b { (b, a) } else { (a, b) };

    inicio
        .iter_days()
        .take_while(|dia| *dia <= fim)
        .fold(ContagemDias::default(), |mut acc, dia| {
            if eh_fim_de_semana(dia) {
                acc.fins_de_semana += 1;
            } else {
                acc.dias_uteis += 1;
            }
            acc
        })
}

pub fn tem_fim_de_semana_no_intervalo(a: NaiveDate, b: NaiveDate) -> bool {
    calcular_dias_uteis(a, b).fins_de_semana > 0
}

/// Diferença com sinal, em dias úteis, de `direita` até `esquerda`.
///
/// Semanas completas valem 5 dias úteis; o restante (no máximo 6 dias) é
/// percorrido dia a dia, ignorando sábados e domingos do lado direito.
///
/// ```
/// use analise_ocorrencias::diferenca_em_dias_uteis;
/// use chrono::NaiveDate;
///
/// let sexta = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
/// let sexta_anterior = NaiveDate::from_ymd_opt(2024, 3, 8).unwrap();
/// assert_eq!(diferenca_em_dias_uteis(sexta, sexta_anterior), 5);
/// assert_eq!(diferenca_em_dias_uteis(sexta_anterior, sexta), -5);
/// ```
pub fn diferenca_em_dias_uteis(esquerda: NaiveDate, direita: NaiveDate) -> i64 {
    let diferenca = (esquerda - direita).num_days();
    let sinal: i64 = if diferenca < 0 { -1 } else { 1 };
    let semanas = diferenca / 7;

    let mut resultado = semanas * 5;
    let mut atual = direita + TimeDelta::days(semanas * 7);

    while atual != esquerda {
        if !eh_fim_de_semana(atual) {
            resultado += sinal;
        }
        atual += TimeDelta::days(sinal);
    }

    resultado
}

/// Diferença em dias corridos, arredondada para cima (`ceil((a - b) / 1 dia)`).
pub fn diferenca_em_dias_corridos(a: NaiveDateTime, b: NaiveDateTime) -> i64 {
    let ms = (a - b).num_milliseconds() as f64;
    (ms / MILISSEGUNDOS_POR_DIA).ceil() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn formato_barra_com_e_sem_hora() {
        let d = parse_flexible_date("31/12/2024").unwrap();
        assert_eq!((d.day(), d.month0(), d.year()), (31, 11, 2024));

        let d = parse_flexible_date("05/03/2024 08:30").unwrap();
        assert_eq!(d, data(2024, 3, 5).and_hms_opt(8, 30, 0).unwrap());

        let d = parse_flexible_date("05/03/2024 08:30:15").unwrap();
        assert_eq!(d, data(2024, 3, 5).and_hms_opt(8, 30, 15).unwrap());
    }

    #[test]
    fn formato_hifen_brasileiro() {
        let d = parse_flexible_date("31-12-2024 14:35").unwrap();
        assert_eq!(d, data(2024, 12, 31).and_hms_opt(14, 35, 0).unwrap());
    }

    #[test]
    fn iso_vai_para_o_fallback() {
        let d = parse_flexible_date("2024-12-31").unwrap();
        assert_eq!(d.date(), data(2024, 12, 31));
        assert_eq!(parse_flexible_date("31/12/2024").unwrap().date(), d.date());

        let d = parse_flexible_date("2024-12-31T10:15:00").unwrap();
        assert_eq!(d, data(2024, 12, 31).and_hms_opt(10, 15, 0).unwrap());

        let d = parse_flexible_date("2024-12-31T10:15:00Z").unwrap();
        assert_eq!(d.date(), data(2024, 12, 31));
    }

    #[test]
    fn data_serial_do_excel() {
        let d = parse_flexible_date("45292").unwrap();
        let esperado = data(1900, 1, 1).and_time(NaiveTime::MIN) + TimeDelta::days(45292 - 2);
        assert_eq!(d, esperado);
        assert_eq!(d.date(), data(2024, 1, 1));

        // Meio dia
        let d = parse_flexible_date("45292.5").unwrap();
        assert_eq!(d, data(2024, 1, 1).and_hms_opt(12, 0, 0).unwrap());

        // Fora da faixa (1000, 100000)
        assert!(parse_flexible_date("1000").is_none());
        assert!(parse_flexible_date("100000").is_none());
    }

    #[test]
    fn entradas_invalidas_retornam_none() {
        assert!(parse_flexible_date("not a date").is_none());
        assert!(parse_flexible_date("").is_none());
        assert!(parse_flexible_date("   ").is_none());
        assert!(parse_flexible_date("aa/bb/cccc").is_none());
        assert!(parse_flexible_date("31/02/2024").is_none());
        assert!(parse_flexible_date("12-ab-2024").is_none());
    }

    #[test]
    fn dias_uteis_e_fins_de_semana() {
        // Segunda 2024-03-11 a domingo 2024-03-17
        let c = calcular_dias_uteis(data(2024, 3, 11), data(2024, 3, 17));
        assert_eq!(c, ContagemDias { dias_uteis: 5, fins_de_semana: 2 });

        // Ordem invertida produz o mesmo resultado
        assert_eq!(calcular_dias_uteis(data(2024, 3, 17), data(2024, 3, 11)), c);

        assert!(tem_fim_de_semana_no_intervalo(data(2024, 3, 15), data(2024, 3, 18)));
        assert!(!tem_fim_de_semana_no_intervalo(data(2024, 3, 11), data(2024, 3, 15)));
    }

    #[test]
    fn diferenca_em_dias_uteis_com_sinal() {
        let quarta = data(2024, 3, 13);
        assert_eq!(diferenca_em_dias_uteis(quarta, quarta), 0);
        assert_eq!(diferenca_em_dias_uteis(quarta, data(2024, 3, 12)), 1);
        // Segunda menos sexta: sábado e domingo não contam
        assert_eq!(diferenca_em_dias_uteis(data(2024, 3, 18), data(2024, 3, 15)), 1);
        assert_eq!(diferenca_em_dias_uteis(data(2024, 3, 15), data(2024, 3, 18)), -1);
        // Duas semanas e um dia
        assert_eq!(diferenca_em_dias_uteis(data(2024, 3, 28), data(2024, 3, 13)), 11);
    }

    #[test]
    fn diferenca_em_dias_corridos_arredonda_para_cima() {
        let a = data(2024, 3, 15).and_hms_opt(12, 0, 0).unwrap();
        let b = data(2024, 3, 13).and_time(NaiveTime::MIN);
        assert_eq!(diferenca_em_dias_corridos(a, b), 3);
        assert_eq!(diferenca_em_dias_corridos(b, b), 0);
    }
}
