//! Leitura em fluxo dos arquivos de rastreamento.
//!
//! As linhas são acumuladas em lotes de tamanho fixo. Cada lote cheio é entregue
//! ao [`Agregador`] e a leitura só continua depois da resposta (contrapressão).
//! O cancelamento é cooperativo: o token é consultado a cada linha lida, antes
//! de cada envio e durante a espera pela agregação.

use calamine::{Data, Reader, open_workbook_auto};
use encoding_rs::WINDOWS_1252;
use serde::Serialize;
use std::{
    fmt,
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tracing::{debug, info, warn};

use crate::{
    AnaliseError, AnaliseResult, Agregador, Cabecalho, DadosProcessados, Linha, REGEX_EXTENSAO,
    TAMANHO_AMOSTRA_PADRAO, TAMANHO_LOTE_PADRAO, detect_delimiter, preprocess_sswweb,
    resolver_coluna_alvo,
};

/// Bytes examinados para detectar o delimitador de um CSV comum.
const BYTES_DETECCAO: usize = 64 * 1024;

/// Sinal de cancelamento de uma ingestão. Clones compartilham o mesmo estado.
///
/// ```
/// use analise_ocorrencias::TokenCancelamento;
///
/// let token = TokenCancelamento::new();
/// let outro = token.clone();
/// outro.cancelar();
/// outro.cancelar(); // idempotente
/// assert!(token.is_cancelado());
/// ```
#[derive(Debug, Clone, Default)]
pub struct TokenCancelamento(Arc<AtomicBool>);

impl TokenCancelamento {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelar(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelado(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TipoArquivo {
    Csv,
    Sswweb,
    Xlsx,
}

impl TipoArquivo {
    /// Identifica o tipo pela extensão (sem distinção de maiúsculas).
    pub fn from_path(path: &Path) -> AnaliseResult<Self> {
        let nome = path.to_string_lossy();
        let extensao = REGEX_EXTENSAO
            .captures(&nome)
            .map(|c| c[1].to_lowercase())
            .unwrap_or_default();

        match extensao.as_str() {
            "csv" => Ok(TipoArquivo::Csv),
            "sswweb" => Ok(TipoArquivo::Sswweb),
            "xlsx" => Ok(TipoArquivo::Xlsx),
            _ => Err(AnaliseError::ExtensaoInvalida {
                arquivo: nome.into_owned(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TipoArquivo::Csv => "csv",
            TipoArquivo::Sswweb => "sswweb",
            TipoArquivo::Xlsx => "xlsx",
        }
    }
}

impl fmt::Display for TipoArquivo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progresso {
    /// 0 a 100; só chega a 100 quando a ingestão termina sem cancelamento.
    pub percentual: u8,
    pub linhas: usize,
    pub mensagem: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcoesIngestao {
    pub tamanho_lote: usize,
    pub tamanho_amostra: usize,
}

impl Default for OpcoesIngestao {
    fn default() -> Self {
        OpcoesIngestao {
            tamanho_lote: TAMANHO_LOTE_PADRAO,
            tamanho_amostra: TAMANHO_AMOSTRA_PADRAO,
        }
    }
}

#[derive(Debug)]
pub enum ResultadoIngestao {
    Concluido(DadosProcessados),
    /// Terminação normal provocada pelo token; nenhum estado parcial é mantido.
    Cancelado,
}

impl ResultadoIngestao {
    pub fn concluido(self) -> Option<DadosProcessados> {
        match self {
            ResultadoIngestao::Concluido(dados) => Some(dados),
            ResultadoIngestao::Cancelado => None,
        }
    }
}

/// Garante progresso não decrescente, com 100 reservado para a conclusão.
struct RelatorProgresso<'a> {
    callback: &'a mut dyn FnMut(&Progresso),
    percentual: u8,
}

impl<'a> RelatorProgresso<'a> {
    fn new(callback: &'a mut dyn FnMut(&Progresso)) -> Self {
        RelatorProgresso {
            callback,
            percentual: 0,
        }
    }

    fn relatar(&mut self, percentual: u8, linhas: usize, mensagem: impl Into<String>) {
        self.percentual = self.percentual.max(percentual.min(99));
        (self.callback)(&Progresso {
            percentual: self.percentual,
            linhas,
            mensagem: mensagem.into(),
        });
    }

    /// Fração `feito/total` mapeada no intervalo `[inicio, 99]`.
    fn relatar_fracao(&mut self, inicio: u8, feito: u64, total: u64, linhas: usize) {
        let fracao = if total == 0 {
            0.0
        } else {
            (feito as f64 / total as f64).min(1.0)
        };
        let percentual = inicio as f64 + fracao * (99 - inicio) as f64;
        self.relatar(
            percentual as u8,
            linhas,
            format!("Carregando dados: {} registros", crate::fmt_milhares(linhas)),
        );
    }

    fn concluir(&mut self, linhas: usize) {
        self.percentual = 100;
        (self.callback)(&Progresso {
            percentual: 100,
            linhas,
            mensagem: format!("Finalizado: {} registros processados", crate::fmt_milhares(linhas)),
        });
    }

    fn reiniciar(&mut self) {
        self.percentual = 0;
        (self.callback)(&Progresso {
            percentual: 0,
            linhas: 0,
            mensagem: "Processamento cancelado".into(),
        });
    }
}

/// Lê, agrega e materializa um arquivo CSV, SSWWEB ou XLSX.
///
/// Cancelamento não é erro: resulta em `Ok(ResultadoIngestao::Cancelado)`.
pub fn ingerir_arquivo(
    path: &Path,
    opcoes: &OpcoesIngestao,
    token: &TokenCancelamento,
    progresso: &mut dyn FnMut(&Progresso),
) -> AnaliseResult<ResultadoIngestao> {
    let tipo = TipoArquivo::from_path(path)?;
    let nome = path.display().to_string();

    let tamanho = std::fs::metadata(path)
        .map_err(|e| AnaliseError::IoReader {
            source: e,
            arquivo: path.to_path_buf(),
        })?
        .len();

    if tamanho == 0 {
        return Err(AnaliseError::ArquivoVazio { arquivo: nome });
    }

    let mut relator = RelatorProgresso::new(progresso);
    relator.relatar(10, 0, format!("Analisando {nome}..."));
    info!(arquivo = %nome, %tipo, bytes = tamanho, "iniciando ingestão");

    let resultado = match tipo {
        TipoArquivo::Csv => ingerir_csv(path, &nome, tamanho, opcoes, token, &mut relator),
        TipoArquivo::Sswweb => {
            let bytes = ler_bytes(path)?;
            ingerir_sswweb_bytes(&bytes, &nome, opcoes, token, &mut relator)
        }
        TipoArquivo::Xlsx => ingerir_xlsx(path, &nome, opcoes, token, &mut relator),
    };

    finalizar(resultado, &mut relator)
}

/// Ingestão de um texto já em memória (CSV comum ou SSWWEB).
pub fn ingerir_texto(
    texto: &str,
    nome: &str,
    tipo: TipoArquivo,
    opcoes: &OpcoesIngestao,
    token: &TokenCancelamento,
    progresso: &mut dyn FnMut(&Progresso),
) -> AnaliseResult<ResultadoIngestao> {
    if texto.trim().is_empty() {
        return Err(AnaliseError::ArquivoVazio {
            arquivo: nome.to_string(),
        });
    }

    let mut relator = RelatorProgresso::new(progresso);
    relator.relatar(10, 0, format!("Analisando {nome}..."));

    let resultado = match tipo {
        TipoArquivo::Csv => {
            let delimitador = detect_delimiter(texto);
            let leitor = construir_leitor(texto.as_bytes(), delimitador);
            processar_csv(leitor, nome, texto.len() as u64, opcoes, token, &mut relator)
        }
        TipoArquivo::Sswweb => ingerir_sswweb_bytes(texto.as_bytes(), nome, opcoes, token, &mut relator),
        TipoArquivo::Xlsx => Err(AnaliseError::ExtensaoInvalida {
            arquivo: nome.to_string(),
        }),
    };

    finalizar(resultado, &mut relator)
}

fn finalizar(
    resultado: AnaliseResult<DadosProcessados>,
    relator: &mut RelatorProgresso,
) -> AnaliseResult<ResultadoIngestao> {
    match resultado {
        Ok(dados) => {
            relator.concluir(dados.total_linhas());
            Ok(ResultadoIngestao::Concluido(dados))
        }
        Err(e) if e.is_cancelamento() => {
            info!("ingestão cancelada");
            relator.reiniciar();
            Ok(ResultadoIngestao::Cancelado)
        }
        Err(e) => Err(e),
    }
}

fn ler_bytes(path: &Path) -> AnaliseResult<Vec<u8>> {
    let mut bytes = Vec::new();
    File::open(path)
        .and_then(|mut f| f.read_to_end(&mut bytes))
        .map_err(|e| AnaliseError::IoReader {
            source: e,
            arquivo: path.to_path_buf(),
        })?;
    Ok(bytes)
}

fn construir_leitor<R: Read>(reader: R, delimitador: u8) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(delimitador)
        .has_headers(true)
        .flexible(false) // Erro se o número de colunas variar
        .trim(csv::Trim::All)
        .buffer_capacity(128 * 1024)
        .from_reader(reader)
}

fn ingerir_csv(
    path: &Path,
    nome: &str,
    tamanho: u64,
    opcoes: &OpcoesIngestao,
    token: &TokenCancelamento,
    relator: &mut RelatorProgresso,
) -> AnaliseResult<DadosProcessados> {
    let file = File::open(path).map_err(|e| AnaliseError::IoReader {
        source: e,
        arquivo: path.to_path_buf(),
    })?;
    let mut reader = BufReader::with_capacity(BYTES_DETECCAO, file);

    // Espia o início do arquivo sem consumir: os bytes continuam no buffer
    let inicio = reader.fill_buf()?;
    let delimitador = detect_delimiter(&decodificar(inicio));

    relator.relatar(15, 0, "Lendo arquivo...");
    processar_csv(construir_leitor(reader, delimitador), nome, tamanho, opcoes, token, relator)
}

fn ingerir_sswweb_bytes(
    bytes: &[u8],
    nome: &str,
    opcoes: &OpcoesIngestao,
    token: &TokenCancelamento,
    relator: &mut RelatorProgresso,
) -> AnaliseResult<DadosProcessados> {
    let texto = decodificar(bytes);

    if texto.split('\n').count() < 2 {
        return Err(AnaliseError::LinhasInsuficientes {
            arquivo: nome.to_string(),
            minimo: 2,
        });
    }

    let preprocessado = preprocess_sswweb(&texto, nome)?;
    relator.relatar(15, 0, "Lendo arquivo...");

    let leitor = construir_leitor(preprocessado.conteudo.as_bytes(), preprocessado.delimitador);
    processar_csv(
        leitor,
        nome,
        preprocessado.conteudo.len() as u64,
        opcoes,
        token,
        relator,
    )
}

/// Acumula as linhas e as repassa ao agregador, lote a lote.
struct Lotes {
    agregador: Agregador,
    tamanho_lote: usize,
    atual: Vec<Linha>,
    completo: Vec<Linha>,
}

impl Lotes {
    fn new(coluna_alvo: &str, tamanho_lote: usize) -> AnaliseResult<Self> {
        let tamanho_lote = tamanho_lote.max(1);
        Ok(Lotes {
            agregador: Agregador::iniciar(coluna_alvo)?,
            tamanho_lote,
            atual: Vec::with_capacity(tamanho_lote),
            completo: Vec::new(),
        })
    }

    /// Retorna `true` quando um lote foi despachado.
    fn push(&mut self, linha: Linha, token: &TokenCancelamento) -> AnaliseResult<bool> {
        self.atual.push(linha);
        if self.atual.len() < self.tamanho_lote {
            return Ok(false);
        }
        self.despachar(token)?;
        Ok(true)
    }

    fn despachar(&mut self, token: &TokenCancelamento) -> AnaliseResult<()> {
        if self.atual.is_empty() {
            return Ok(());
        }
        let lote = std::mem::replace(&mut self.atual, Vec::with_capacity(self.tamanho_lote));
        let devolvidas = self.agregador.processar_lote(lote, token)?;
        self.completo.extend(devolvidas);
        Ok(())
    }

    fn linhas(&self) -> usize {
        self.completo.len() + self.atual.len()
    }

    fn concluir(
        mut self,
        token: &TokenCancelamento,
        coluna_alvo: String,
        tamanho_amostra: usize,
    ) -> AnaliseResult<DadosProcessados> {
        // Lote parcial final
        self.despachar(token)?;
        debug!(lotes = self.agregador.lotes_processados(), "agregação finalizada");
        let meta = self.agregador.finalizar()?;
        registrar_amostra_alvo(&self.completo, &coluna_alvo);
        Ok(DadosProcessados::new(self.completo, meta, coluna_alvo, tamanho_amostra))
    }
}

fn processar_csv<R: Read>(
    mut leitor: csv::Reader<R>,
    nome: &str,
    total_bytes: u64,
    opcoes: &OpcoesIngestao,
    token: &TokenCancelamento,
    relator: &mut RelatorProgresso,
) -> AnaliseResult<DadosProcessados> {
    let cabecalho = {
        let campos = leitor
            .byte_headers()
            .map_err(|e| AnaliseError::from_csv(e, nome, 1))?;
        Arc::new(Cabecalho::new(campos.iter().map(decodificar)))
    };

    if cabecalho.is_empty() || cabecalho.nomes().iter().all(String::is_empty) {
        return Err(AnaliseError::ArquivoVazio {
            arquivo: nome.to_string(),
        });
    }

    let alvo = resolver_coluna_alvo(cabecalho.nomes())?;
    info!(colunas = cabecalho.len(), alvo = %alvo.nome, origem = ?alvo.origem, "cabeçalho lido");

    let mut lotes = Lotes::new(&alvo.nome, opcoes.tamanho_lote)?;
    let mut record = csv::ByteRecord::new();

    loop {
        if token.is_cancelado() {
            return Err(AnaliseError::Cancelado);
        }

        let linha_arquivo = leitor.position().line() as usize;
        let lido = leitor
            .read_byte_record(&mut record)
            .map_err(|e| AnaliseError::from_csv(e, nome, linha_arquivo))?;
        if !lido {
            break;
        }

        let valores: Vec<String> = record.iter().map(decodificar).collect();
        if lotes.push(Linha::new(Arc::clone(&cabecalho), valores), token)? {
            relator.relatar_fracao(15, leitor.position().byte(), total_bytes, lotes.linhas());
        }
    }

    lotes.concluir(token, alvo.nome, opcoes.tamanho_amostra)
}

fn ingerir_xlsx(
    path: &Path,
    nome: &str,
    opcoes: &OpcoesIngestao,
    token: &TokenCancelamento,
    relator: &mut RelatorProgresso,
) -> AnaliseResult<DadosProcessados> {
    relator.relatar(20, 0, "Lendo planilha...");

    // Sem ponto de suspensão: a planilha inteira é carregada antes de qualquer etapa
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook.worksheet_range_at(0).ok_or_else(|| AnaliseError::ArquivoVazio {
        arquivo: nome.to_string(),
    })??;

    relator.relatar(40, 0, "Convertendo XLSX...");

    let mut linhas_planilha = range.rows();
    let cabecalho = match linhas_planilha.next() {
        Some(primeira) => Arc::new(Cabecalho::new(primeira.iter().map(celula_para_string))),
        None => {
            return Err(AnaliseError::ArquivoVazio {
                arquivo: nome.to_string(),
            });
        }
    };

    let alvo = resolver_coluna_alvo(cabecalho.nomes())?;
    info!(colunas = cabecalho.len(), alvo = %alvo.nome, "cabeçalho da planilha lido");

    let total = range.height().saturating_sub(1) as u64;
    let mut lotes = Lotes::new(&alvo.nome, opcoes.tamanho_lote)?;

    for (i, celulas) in linhas_planilha.enumerate() {
        let valores: Vec<String> = celulas.iter().map(celula_para_string).collect();
        if lotes.push(Linha::new(Arc::clone(&cabecalho), valores), token)? {
            relator.relatar_fracao(60, i as u64 + 1, total, lotes.linhas());
        }
    }

    lotes.concluir(token, alvo.nome, opcoes.tamanho_amostra)
}

/// Valor bruto da célula; datas viram o número serial do Excel.
fn celula_para_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                format!("{f}")
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(d) => d.as_f64().to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Empty | Data::Error(_) => String::new(),
    }
}

/// UTF-8 quando válido, senão Windows-1252 (exportações antigas do SSW).
fn decodificar(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (texto, _, _) = WINDOWS_1252.decode(bytes);
            texto.into_owned()
        }
    }
}

fn registrar_amostra_alvo(linhas: &[Linha], coluna_alvo: &str) {
    let amostra = linhas.iter().take(100);
    let tamanho = amostra.len();
    let preenchidos = amostra
        .filter(|l| l.get(coluna_alvo).is_some_and(|v| !v.is_empty()))
        .count();

    if tamanho > 0 && preenchidos == 0 {
        warn!(coluna = coluna_alvo, "nenhum valor na amostra da coluna alvo");
    } else {
        debug!(coluna = coluna_alvo, preenchidos, tamanho, "amostra da coluna alvo");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::COLUNA_ALVO;

    fn csv_simples(linhas: usize) -> String {
        let mut texto = format!("CTRC;UF de Entrega;Unidade Receptora;{COLUNA_ALVO}\n");
        for i in 0..linhas {
            let codigo = if i % 2 == 0 { "1" } else { "59" };
            texto.push_str(&format!("CT{i};SP;ABC;{codigo}\n"));
        }
        texto
    }

    #[test]
    fn tipo_pela_extensao() {
        assert_eq!(TipoArquivo::from_path(Path::new("a.CSV")).unwrap(), TipoArquivo::Csv);
        assert_eq!(TipoArquivo::from_path(Path::new("a.sswweb")).unwrap(), TipoArquivo::Sswweb);
        assert_eq!(TipoArquivo::from_path(Path::new("x/a.xlsx")).unwrap(), TipoArquivo::Xlsx);
        assert!(matches!(
            TipoArquivo::from_path(Path::new("a.pdf")),
            Err(AnaliseError::ExtensaoInvalida { .. })
        ));
    }

    #[test]
    fn lotes_e_progresso_monotonico() {
        let texto = csv_simples(25);
        let opcoes = OpcoesIngestao {
            tamanho_lote: 10,
            tamanho_amostra: 5,
        };
        let mut historico = Vec::new();
        let resultado = ingerir_texto(
            &texto,
            "t.csv",
            TipoArquivo::Csv,
            &opcoes,
            &TokenCancelamento::new(),
            &mut |p| historico.push(p.percentual),
        )
        .unwrap();

        let dados = resultado.concluido().unwrap();
        assert_eq!(dados.total_linhas(), 25);
        assert_eq!(dados.amostra.len(), 5);
        assert_eq!(dados.meta.total_processado, 25);
        assert_eq!(dados.meta.frequencia["1"], 13);
        assert_eq!(dados.coluna_alvo, COLUNA_ALVO);

        assert!(historico.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(historico.last(), Some(&100));
        assert_eq!(historico.iter().filter(|p| **p == 100).count(), 1);
    }

    #[test]
    fn cancelamento_no_meio_do_fluxo() {
        let texto = csv_simples(100);
        let opcoes = OpcoesIngestao {
            tamanho_lote: 10,
            tamanho_amostra: 5,
        };
        let token = TokenCancelamento::new();
        let gatilho = token.clone();
        let mut historico = Vec::new();

        let resultado = ingerir_texto(&texto, "t.csv", TipoArquivo::Csv, &opcoes, &token, &mut |p| {
            historico.push(p.clone());
            // Cancela logo após o primeiro lote
            if p.linhas >= 10 {
                gatilho.cancelar();
            }
        })
        .unwrap();

        assert!(matches!(resultado, ResultadoIngestao::Cancelado));
        let ultimo = historico.last().unwrap();
        assert_eq!(ultimo.percentual, 0);
        assert!(historico.iter().all(|p| p.percentual < 100));
        // Nenhum lote depois do cancelamento
        assert!(historico.iter().all(|p| p.linhas <= 10));
    }

    #[test]
    fn cancelar_depois_de_concluir_nao_tem_efeito() {
        let token = TokenCancelamento::new();
        let resultado = ingerir_texto(
            &csv_simples(3),
            "t.csv",
            TipoArquivo::Csv,
            &OpcoesIngestao::default(),
            &token,
            &mut |_| {},
        )
        .unwrap();
        token.cancelar();
        token.cancelar();
        let dados = resultado.concluido().unwrap();
        assert_eq!(dados.total_linhas(), 3);
    }

    #[test]
    fn numero_de_colunas_diferente_aborta() {
        let texto = format!("A;B;{COLUNA_ALVO}\n1;2;3\n1;2\n");
        let erro = ingerir_texto(
            &texto,
            "t.csv",
            TipoArquivo::Csv,
            &OpcoesIngestao::default(),
            &TokenCancelamento::new(),
            &mut |_| {},
        )
        .unwrap_err();
        assert!(matches!(
            erro,
            AnaliseError::ColumnCount { esperado: 3, encontrado: 2, .. }
        ));
    }

    #[test]
    fn coluna_alvo_ausente_em_arquivo_curto() {
        let erro = ingerir_texto(
            "A;B\n1;2\n",
            "t.csv",
            TipoArquivo::Csv,
            &OpcoesIngestao::default(),
            &TokenCancelamento::new(),
            &mut |_| {},
        )
        .unwrap_err();
        assert_eq!(erro.titulo(), "Erro na estrutura do arquivo");
    }

    #[test]
    fn sswweb_descarta_primeira_linha() {
        let texto = format!("Relatorio 455, gerado, em, 01/03/2024\n{}", csv_simples(4));
        let dados = ingerir_texto(
            &texto,
            "t.sswweb",
            TipoArquivo::Sswweb,
            &OpcoesIngestao::default(),
            &TokenCancelamento::new(),
            &mut |_| {},
        )
        .unwrap()
        .concluido()
        .unwrap();

        assert_eq!(dados.total_linhas(), 4);
        assert_eq!(dados.cabecalho().unwrap().nomes()[0], "CTRC");
        assert!(dados.meta.ufs_unidades["SP"].contains("ABC"));
    }

    #[test]
    fn texto_em_windows_1252() {
        // "São Paulo" com 'ã' = 0xE3
        let bytes = b"Cidade;X\nS\xe3o Paulo;1\n";
        assert_eq!(decodificar(&bytes[9..]), "São Paulo;1\n");
    }

    #[test]
    fn celulas_da_planilha() {
        assert_eq!(celula_para_string(&Data::Float(45292.0)), "45292");
        assert_eq!(celula_para_string(&Data::Float(1.5)), "1.5");
        assert_eq!(celula_para_string(&Data::Empty), "");
        assert_eq!(celula_para_string(&Data::String(" SP ".into())), "SP");
    }
}
