//! Classificação "sem prazo": compara a previsão de entrega com a data do último
//! manifesto, em dias úteis, contra o prazo ideal da cidade.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::{
    ColunasResolvidas, ConsultaPrazo, ContagemUnidade, DadosProcessados, FiltroSelecao, Linha,
    diferenca_em_dias_uteis, filtrar_por_local, parse_flexible_date, percentual,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StatusPrazo {
    NoPrazo,
    SemPrazo,
}

/// Regra de atraso sobre `delta = dias_uteis(previsão) - dias_uteis(manifesto)`.
///
/// Chegar na data prevista ou depois dela é sempre atraso. Chegar antes só está
/// no prazo quando os dias úteis decorridos alcançam o prazo ideal.
///
/// ```
/// use analise_ocorrencias::{StatusPrazo, classificar_atraso};
///
/// assert_eq!(classificar_atraso(0, 3), StatusPrazo::SemPrazo);
/// assert_eq!(classificar_atraso(5, 3), StatusPrazo::NoPrazo);
/// assert_eq!(classificar_atraso(1, 3), StatusPrazo::SemPrazo);
/// assert_eq!(classificar_atraso(-2, 3), StatusPrazo::SemPrazo);
/// ```
pub fn classificar_atraso(delta: i64, prazo_ideal: u32) -> StatusPrazo {
    if delta <= 0 || delta.unsigned_abs() < u64::from(prazo_ideal) {
        StatusPrazo::SemPrazo
    } else {
        StatusPrazo::NoPrazo
    }
}

/// Rótulo de prazo: `Chegou Hoje`, `1 dia`, `n dias`.
///
/// ```
/// use analise_ocorrencias::formatar_prazo;
///
/// assert_eq!(formatar_prazo(0), "Chegou Hoje");
/// assert_eq!(formatar_prazo(1), "1 dia");
/// assert_eq!(formatar_prazo(4), "4 dias");
/// ```
pub fn formatar_prazo(dias: i64) -> String {
    match dias {
        0 => "Chegou Hoje".to_string(),
        1 => "1 dia".to_string(),
        n => format!("{n} dias"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasPrazo {
    pub previsao: NaiveDateTime,
    pub manifesto: NaiveDateTime,
}

/// Previsão de entrega e último manifesto, quando ambos são legíveis.
pub fn datas_da_linha(linha: &Linha, colunas: &ColunasResolvidas) -> Option<DatasPrazo> {
    let previsao = parse_flexible_date(linha.campo(colunas.previsao_entrega.as_ref()?))?;
    let manifesto = parse_flexible_date(linha.campo(colunas.ultimo_manifesto.as_ref()?))?;
    Some(DatasPrazo { previsao, manifesto })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvaliacaoPrazo {
    pub datas: DatasPrazo,
    pub prazo_ideal: u32,
    pub delta_uteis: i64,
    pub status: StatusPrazo,
}

/// Motivo pelo qual uma linha fica fora da classificação.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusao {
    /// Cidade, unidade ou alguma das datas vazia (ou coluna não resolvida).
    DadosFaltantes,
    DataInvalida,
    PrazoNaoCadastrado,
}

/// Classifica uma linha. Linhas sem cidade/unidade, com data ilegível ou sem
/// prazo cadastrado são excluídas.
pub fn avaliar_linha(
    linha: &Linha,
    colunas: &ColunasResolvidas,
    prazos: &dyn ConsultaPrazo,
) -> Result<AvaliacaoPrazo, Exclusao> {
    let cidade = linha.campo_opcional(colunas.cidade.as_ref());
    let unidade = linha.campo_opcional(colunas.unidade.as_ref());
    let previsao = linha.campo_opcional(colunas.previsao_entrega.as_ref());
    let manifesto = linha.campo_opcional(colunas.ultimo_manifesto.as_ref());

    if [cidade, unidade, previsao, manifesto].iter().any(|v| v.is_empty()) {
        return Err(Exclusao::DadosFaltantes);
    }

    let (Some(previsao), Some(manifesto)) = (parse_flexible_date(previsao), parse_flexible_date(manifesto))
    else {
        return Err(Exclusao::DataInvalida);
    };

    let prazo_ideal = prazos
        .prazo_por_cidade(cidade, unidade)
        .ok_or(Exclusao::PrazoNaoCadastrado)?;

    let delta_uteis = diferenca_em_dias_uteis(previsao.date(), manifesto.date());

    Ok(AvaliacaoPrazo {
        datas: DatasPrazo { previsao, manifesto },
        prazo_ideal,
        delta_uteis,
        status: classificar_atraso(delta_uteis, prazo_ideal),
    })
}

/// Verdadeiro apenas para linhas classificáveis e atrasadas.
pub fn esta_sem_prazo(linha: &Linha, colunas: &ColunasResolvidas, prazos: &dyn ConsultaPrazo) -> bool {
    matches!(
        avaliar_linha(linha, colunas, prazos),
        Ok(AvaliacaoPrazo {
            status: StatusPrazo::SemPrazo,
            ..
        })
    )
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResumoSemPrazo {
    pub quantidade: usize,
    /// Linhas classificadas (denominador do percentual).
    pub total_classificado: usize,
    pub percentual: f64,
    pub unidades: Vec<ContagemUnidade>,
    pub sem_prazo_cadastrado: usize,
    pub datas_invalidas: usize,
    pub dados_faltantes: usize,
}

/// Total de linhas atrasadas no escopo do filtro (UF e unidades) e as unidades afetadas.
pub fn resumo_sem_prazo(
    dados: &DadosProcessados,
    filtro: &FiltroSelecao,
    prazos: &dyn ConsultaPrazo,
) -> ResumoSemPrazo {
    let colunas = &dados.colunas;
    let mut resumo = ResumoSemPrazo::default();
    let mut por_unidade: BTreeMap<(String, String), usize> = BTreeMap::new();

    for linha in filtrar_por_local(&dados.completo, colunas, filtro) {
        match avaliar_linha(linha, colunas, prazos) {
            Ok(avaliacao) => {
                resumo.total_classificado += 1;
                if avaliacao.status == StatusPrazo::SemPrazo {
                    resumo.quantidade += 1;
                    let unidade = linha.campo_opcional(colunas.unidade.as_ref()).to_string();
                    let uf = linha.campo_opcional(colunas.uf.as_ref()).to_string();
                    *por_unidade.entry((unidade, uf)).or_insert(0) += 1;
                }
            }
            Err(Exclusao::DadosFaltantes) => resumo.dados_faltantes += 1,
            Err(Exclusao::DataInvalida) => resumo.datas_invalidas += 1,
            Err(Exclusao::PrazoNaoCadastrado) => resumo.sem_prazo_cadastrado += 1,
        }
    }

    resumo.percentual = percentual(resumo.quantidade, resumo.total_classificado);
    resumo.unidades = ContagemUnidade::ordenar(por_unidade);

    info!(
        atrasadas = resumo.quantidade,
        classificadas = resumo.total_classificado,
        sem_prazo_cadastrado = resumo.sem_prazo_cadastrado,
        datas_invalidas = resumo.datas_invalidas,
        dados_faltantes = resumo.dados_faltantes,
        "classificação sem prazo"
    );

    resumo
}
