use tracing::{debug, info};

use crate::{AnaliseError, AnaliseResult};

/// Delimitadores candidatos, em ordem de preferência no empate.
pub const DELIMITADORES: [u8; 4] = [b';', b',', b'\t', b'|'];

/// Delimitador usado quando nenhum candidato é consistente.
pub const DELIMITADOR_PADRAO: u8 = b';';

/// Número de linhas examinadas pela detecção.
const LINHAS_AMOSTRA: usize = 5;

/// Detecta o delimitador a partir das primeiras linhas do texto.
///
/// Para cada candidato conta as ocorrências por linha e calcula a média.
/// Vence o candidato de maior média cujas contagens não se afastam da média
/// em mais de 1 (e com média positiva). Sem vencedor, retorna `;`.
///
/// ```
/// use analise_ocorrencias::detect_delimiter;
///
/// assert_eq!(detect_delimiter("a,b,c\n1,2,3\n4,5,6"), b',');
/// assert_eq!(detect_delimiter("sem delimitador"), b';');
/// ```
pub fn detect_delimiter(texto: &str) -> u8 {
    // Linhas em branco (como a quebra final) não entram na amostra
    let amostra: Vec<&str> = texto
        .split('\n')
        .map(|linha| linha.trim_end_matches('\r'))
        .filter(|linha| !linha.is_empty())
        .take(LINHAS_AMOSTRA)
        .collect();

    let mut melhor = DELIMITADOR_PADRAO;
    let mut maior_media = 0.0;

    for delimitador in DELIMITADORES {
        let contagens: Vec<f64> = amostra
            .iter()
            .map(|linha| linha.bytes().filter(|b| *b == delimitador).count() as f64)
            .collect();

        let media = contagens.iter().sum::<f64>() / contagens.len() as f64;
        let consistente = contagens.iter().all(|c| (c - media).abs() <= 1.0);

        if consistente && media > 0.0 && media > maior_media {
            maior_media = media;
            melhor = delimitador;
        }
    }

    debug!(
        delimitador = %char::from(melhor).escape_default(),
        media = maior_media,
        "delimitador detectado"
    );
    melhor
}

/// Conteúdo de um arquivo SSWWEB pronto para o leitor CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preprocessado<'a> {
    /// Texto a partir da linha de cabeçalho (a primeira linha foi removida).
    pub conteudo: &'a str,
    pub delimitador: u8,
    pub cabecalhos: Vec<String>,
}

/// Remove a linha de metadados do SSWWEB, detecta o delimitador no restante
/// e extrai os cabeçalhos da segunda linha.
///
/// ```
/// use analise_ocorrencias::preprocess_sswweb;
///
/// let texto = "Relatorio 455 - emitido em 01/03/2024\nCTRC;Placa\n123;ABC1D23\n";
/// let p = preprocess_sswweb(texto, "export.sswweb").unwrap();
/// assert_eq!(p.delimitador, b';');
/// assert_eq!(p.cabecalhos, ["CTRC", "Placa"]);
/// assert!(p.conteudo.starts_with("CTRC;Placa"));
/// ```
pub fn preprocess_sswweb<'a>(texto: &'a str, arquivo: &str) -> AnaliseResult<Preprocessado<'a>> {
    let Some((primeira, conteudo)) = texto.split_once('\n') else {
        return Err(AnaliseError::LinhasInsuficientes {
            arquivo: arquivo.to_string(),
            minimo: 2,
        });
    };

    let previa: String = primeira.trim_end().chars().take(200).collect();
    info!(primeira_linha = %previa, "removendo linha de metadados do SSWWEB");

    let delimitador = detect_delimiter(conteudo);
    let linha_cabecalho = conteudo.split('\n').next().unwrap_or_default();
    let cabecalhos: Vec<String> = linha_cabecalho
        .split(char::from(delimitador))
        .map(|h| h.trim().to_string())
        .collect();

    debug!(total = cabecalhos.len(), "cabeçalhos do SSWWEB");

    Ok(Preprocessado {
        conteudo,
        delimitador,
        cabecalhos,
    })
}
