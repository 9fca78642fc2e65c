use regex::Regex;
use std::sync::LazyLock;

/// Extensões aceitas para upload, seguindo o padrão (?ix)
/// i: case-insensitive
/// x: modo verbose (ignora espaços e permite comentários)
pub static REGEX_EXTENSAO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \.
        (
            csv    | # Texto delimitado com cabeçalho
            sswweb | # Exportação SSW: primeira linha de metadados
            xlsx     # Planilha binária (apenas a primeira aba)
        )
        $ # Fim da string
        ",
    )
    .unwrap()
});

// Data ISO no início da string: direciona para o parser nativo
pub static RE_ISO_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").unwrap());

// Número puro (inteiro ou decimal), candidato a data serial do Excel
pub static RE_NUMERO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+(?:\.\d+)?$").unwrap());

// Espaços em sequência (ou tabulações) viram um único espaço
pub static RE_MULTISPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensoes_aceitas() {
        let ext = |nome: &str| {
            REGEX_EXTENSAO
                .captures(nome)
                .map(|c| c[1].to_lowercase())
        };
        assert_eq!(ext("Relatorio 455.CSV").as_deref(), Some("csv"));
        assert_eq!(ext("export.sswweb").as_deref(), Some("sswweb"));
        assert_eq!(ext("planilha.xlsx").as_deref(), Some("xlsx"));
        assert_eq!(ext("planilha.xls"), None);
        assert_eq!(ext("dados.txt"), None);
    }

    #[test]
    fn prefixo_iso_e_numero() {
        assert!(RE_ISO_PREFIX.is_match("2024-12-31"));
        assert!(RE_ISO_PREFIX.is_match("2024-12-31T10:00:00"));
        assert!(!RE_ISO_PREFIX.is_match("31-12-2024"));
        assert!(RE_NUMERO.is_match("45292"));
        assert!(RE_NUMERO.is_match("45292.5"));
        assert!(!RE_NUMERO.is_match("45292abc"));
    }
}
