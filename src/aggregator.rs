//! Redução dos lotes de linhas em frequências, índices de UF/unidade e
//! contagens de cidade por código.
//!
//! A redução roda em uma thread dedicada. O coordenador envia um lote por vez
//! (canal de capacidade 1) e só envia o próximo depois de receber a resposta.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        Arc,
        mpsc::{self, Receiver, RecvTimeoutError, SyncSender},
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{debug, warn};

use crate::{AnaliseError, AnaliseResult, ColunasResolvidas, Linha, TokenCancelamento};

/// Intervalo de verificação do token de cancelamento enquanto um lote é agregado.
const INTERVALO_CANCELAMENTO: Duration = Duration::from_millis(25);

/// Resultado (parcial ou final) da agregação.
///
/// A junção de dois resultados é comutativa e associativa: somas de inteiros
/// e uniões de conjuntos, chave a chave.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultadoAgregacao {
    /// código -> quantidade
    #[serde(rename = "frequencyMap")]
    pub frequencia: BTreeMap<String, usize>,

    #[serde(rename = "ufEntregas")]
    pub ufs: BTreeSet<String>,

    /// UF -> unidades
    #[serde(rename = "ufUnidades")]
    pub ufs_unidades: BTreeMap<String, BTreeSet<String>>,

    /// código -> cidade -> quantidade
    #[serde(rename = "cityByCodeMap", default)]
    pub cidades_por_codigo: BTreeMap<String, BTreeMap<String, usize>>,

    #[serde(rename = "totalCount", alias = "totalProcessed")]
    pub total_processado: usize,
}

impl ResultadoAgregacao {
    /// Junta dois resultados parciais.
    pub fn merge(mut self, outro: ResultadoAgregacao) -> ResultadoAgregacao {
        self.absorver(outro);
        self
    }

    pub fn absorver(&mut self, outro: ResultadoAgregacao) {
        for (codigo, qtd) in outro.frequencia {
            *self.frequencia.entry(codigo).or_insert(0) += qtd;
        }

        self.ufs.extend(outro.ufs);

        for (uf, unidades) in outro.ufs_unidades {
            self.ufs_unidades.entry(uf).or_default().extend(unidades);
        }

        for (codigo, cidades) in outro.cidades_por_codigo {
            let destino = self.cidades_por_codigo.entry(codigo).or_default();
            for (cidade, qtd) in cidades {
                *destino.entry(cidade).or_insert(0) += qtd;
            }
        }

        self.total_processado += outro.total_processado;
    }

    /// Soma das frequências (linhas com código preenchido).
    pub fn total_com_codigo(&self) -> usize {
        self.frequencia.values().sum()
    }

    pub(crate) fn registrar(&mut self, linha: &Linha, colunas: &ColunasResolvidas, indice_alvo: Option<usize>) {
        self.total_processado += 1;

        let uf = linha.campo_opcional(colunas.uf.as_ref());
        if !uf.is_empty() {
            self.ufs.insert(uf.to_string());

            let unidade = linha.campo_opcional(colunas.unidade.as_ref());
            if !unidade.is_empty() {
                self.ufs_unidades
                    .entry(uf.to_string())
                    .or_default()
                    .insert(unidade.to_string());
            }
        }

        // Sem código: a linha conta apenas para UF/unidade
        let codigo = indice_alvo.map(|i| linha.valor(i).trim()).unwrap_or_default();
        if codigo.is_empty() {
            return;
        }

        *self.frequencia.entry(codigo.to_string()).or_insert(0) += 1;

        let cidade = linha.campo_opcional(colunas.cidade.as_ref());
        if !cidade.is_empty() {
            *self
                .cidades_por_codigo
                .entry(codigo.to_string())
                .or_default()
                .entry(cidade.to_string())
                .or_insert(0) += 1;
        }
    }
}

/// Reduz um lote de linhas (que compartilham o mesmo cabeçalho).
///
/// ```
/// use analise_ocorrencias::{Cabecalho, Linha, reduce};
/// use std::sync::Arc;
///
/// let cab = Arc::new(Cabecalho::new(["UF de Entrega", "Codigo da Ultima Ocorrencia"]));
/// let linhas: Vec<Linha> = [["SP", "1"], ["SP", ""], ["RJ", "1"]]
///     .iter()
///     .map(|v| Linha::new(cab.clone(), v.iter().map(|s| s.to_string()).collect()))
///     .collect();
///
/// let r = reduce(&linhas, "Codigo da Ultima Ocorrencia");
/// assert_eq!(r.frequencia["1"], 2);
/// assert_eq!(r.ufs.len(), 2);
/// assert_eq!(r.total_processado, 3);
/// ```
pub fn reduce(linhas: &[Linha], coluna_alvo: &str) -> ResultadoAgregacao {
    let Some(primeira) = linhas.first() else {
        return ResultadoAgregacao::default();
    };

    let colunas = ColunasResolvidas::resolver(primeira.cabecalho().nomes());
    let indice_alvo = primeira.cabecalho().posicao(coluna_alvo);

    if indice_alvo.is_none() {
        warn!(coluna = coluna_alvo, "coluna alvo ausente no lote");
    }

    linhas
        .par_iter()
        .fold(ResultadoAgregacao::default, |mut acc, linha| {
            acc.registrar(linha, &colunas, indice_alvo);
            acc
        })
        .reduce(ResultadoAgregacao::default, ResultadoAgregacao::merge)
}

struct Pedido {
    linhas: Vec<Linha>,
    coluna_alvo: Arc<str>,
}

/// O lote volta ao coordenador junto com o resultado parcial.
struct Resposta {
    linhas: Vec<Linha>,
    parcial: ResultadoAgregacao,
}

/// Coordenador do contexto isolado de agregação.
///
/// Mantém no máximo um lote em trânsito e acumula os resultados parciais
/// na ordem de chegada.
pub struct Agregador {
    pedidos: Option<SyncSender<Pedido>>,
    respostas: Receiver<Resposta>,
    handle: Option<JoinHandle<()>>,
    coluna_alvo: Arc<str>,
    acumulado: ResultadoAgregacao,
    lotes: usize,
}

impl Agregador {
    pub fn iniciar(coluna_alvo: &str) -> AnaliseResult<Self> {
        let (tx_pedido, rx_pedido) = mpsc::sync_channel::<Pedido>(1);
        let (tx_resposta, rx_resposta) = mpsc::sync_channel::<Resposta>(1);

        let handle = thread::Builder::new()
            .name("agregador".into())
            .spawn(move || {
                // Termina quando o coordenador descarta o transmissor
                for pedido in rx_pedido {
                    let parcial = reduce(&pedido.linhas, &pedido.coluna_alvo);
                    let resposta = Resposta {
                        linhas: pedido.linhas,
                        parcial,
                    };
                    if tx_resposta.send(resposta).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Agregador {
            pedidos: Some(tx_pedido),
            respostas: rx_resposta,
            handle: Some(handle),
            coluna_alvo: Arc::from(coluna_alvo),
            acumulado: ResultadoAgregacao::default(),
            lotes: 0,
        })
    }

    /// Envia um lote e aguarda o resultado, devolvendo as linhas ao chamador.
    ///
    /// Retorna `AnaliseError::Cancelado` se o token for acionado antes do envio
    /// ou durante a espera.
    pub fn processar_lote(
        &mut self,
        linhas: Vec<Linha>,
        cancelamento: &TokenCancelamento,
    ) -> AnaliseResult<Vec<Linha>> {
        if cancelamento.is_cancelado() {
            return Err(AnaliseError::Cancelado);
        }

        let pedidos = self
            .pedidos
            .as_ref()
            .ok_or_else(|| AnaliseError::Agregador("agregador já finalizado".into()))?;

        let tamanho = linhas.len();
        pedidos
            .send(Pedido {
                linhas,
                coluna_alvo: Arc::clone(&self.coluna_alvo),
            })
            .map_err(|_| AnaliseError::Agregador("thread do agregador encerrada".into()))?;

        loop {
            match self.respostas.recv_timeout(INTERVALO_CANCELAMENTO) {
                Ok(resposta) => {
                    self.lotes += 1;
                    debug!(lote = self.lotes, linhas = tamanho, "lote agregado");
                    self.acumulado.absorver(resposta.parcial);
                    return Ok(resposta.linhas);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if cancelamento.is_cancelado() {
                        return Err(AnaliseError::Cancelado);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(AnaliseError::Agregador(
                        "thread do agregador terminou sem responder".into(),
                    ));
                }
            }
        }
    }

    pub fn lotes_processados(&self) -> usize {
        self.lotes
    }

    /// Encerra a thread e devolve o resultado acumulado.
    pub fn finalizar(mut self) -> AnaliseResult<ResultadoAgregacao> {
        self.encerrar()?;
        Ok(std::mem::take(&mut self.acumulado))
    }

    fn encerrar(&mut self) -> AnaliseResult<()> {
        self.pedidos.take();
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| AnaliseError::Agregador("thread do agregador entrou em pânico".into())),
            None => Ok(()),
        }
    }
}

impl Drop for Agregador {
    fn drop(&mut self) {
        if let Err(e) = self.encerrar() {
            warn!("{e}");
        }
    }
}

/// Agrega um conjunto já carregado, em lotes, pelo mesmo protocolo da ingestão.
pub fn agregar_em_lotes(
    linhas: Vec<Linha>,
    coluna_alvo: &str,
    tamanho_lote: usize,
) -> AnaliseResult<(ResultadoAgregacao, Vec<Linha>)> {
    let token = TokenCancelamento::new();
    let mut agregador = Agregador::iniciar(coluna_alvo)?;
    let mut devolvidas = Vec::with_capacity(linhas.len());
    let mut restantes = linhas.into_iter().peekable();

    while restantes.peek().is_some() {
        let lote: Vec<Linha> = restantes.by_ref().take(tamanho_lote.max(1)).collect();
        devolvidas.extend(agregador.processar_lote(lote, &token)?);
    }

    Ok((agregador.finalizar()?, devolvidas))
}
