//! Detalhamento de uma unidade: linhas agrupadas por duas chaves, com a lista
//! de CTRCs de cada grupo para cópia.
//!
//! | Visão               | Chave A            | Chave B                    |
//! |---------------------|--------------------|----------------------------|
//! | código / projeção   | cidade             | data da última ocorrência  |
//! | insucessos          | código             | data da última ocorrência  |
//! | sem prazo           | prazo (dias corr.) | cidade                     |

use serde::Serialize;
use std::{cmp::Ordering, collections::BTreeMap};

use crate::{
    CODIGO_EM_ROTA, CODIGO_ENTREGUE, CODIGOS_INSUCESSO, ConsultaPrazo, DadosProcessados,
    FiltroSelecao, Linha, StatusPrazo, avaliar_linha, diferenca_em_dias_corridos, filtrar_por_local,
    formatar_prazo, parse_flexible_date, tem_fim_de_semana_no_intervalo,
};

const NAO_DISPONIVEL: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum VisaoDetalhe {
    Codigo(String),
    /// Entregues + em rota.
    Projecao,
    Insucessos,
    SemPrazo,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GrupoDetalhe {
    pub chave_a: String,
    pub chave_b: String,
    pub quantidade: usize,
    pub ctrcs: Vec<String>,
    /// Apenas na visão sem prazo.
    pub prazo_ideal: Option<String>,
    #[serde(skip)]
    prazo_ideal_dias: Option<u32>,
    /// Algum CTRC do grupo tem fim de semana entre o manifesto e a previsão.
    pub tem_fim_de_semana: bool,
}

impl GrupoDetalhe {
    /// `"<A> - <B>"` seguido de um CTRC por linha.
    pub fn texto_copia(&self) -> String {
        let mut texto = format!("{} - {}", self.chave_a, self.chave_b);
        for ctrc in &self.ctrcs {
            texto.push('\n');
            texto.push_str(ctrc);
        }
        texto
    }
}

/// Texto de todos os grupos, separados por uma linha em branco.
pub fn texto_copia_todos(grupos: &[GrupoDetalhe]) -> String {
    grupos
        .iter()
        .map(GrupoDetalhe::texto_copia)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Agrupa as linhas da unidade (dentro da UF do filtro) conforme a visão.
///
/// Grupos em ordem de (chave A, chave B); use [`ordenar_grupos`] para outra ordem.
pub fn detalhar_unidade(
    dados: &DadosProcessados,
    filtro: &FiltroSelecao,
    unidade: &str,
    visao: &VisaoDetalhe,
    prazos: &dyn ConsultaPrazo,
) -> Vec<GrupoDetalhe> {
    let colunas = &dados.colunas;
    let Some(ocorrencia) = colunas.ocorrencia.as_ref() else {
        return Vec::new();
    };

    let linhas = filtrar_por_local(&dados.completo, colunas, &filtro.com_unidade(unidade));
    let mut grupos: BTreeMap<(String, String), GrupoDetalhe> = BTreeMap::new();

    let ctrc_de = |linha: &Linha| match linha.campo_opcional(colunas.ctrc.as_ref()) {
        "" => NAO_DISPONIVEL.to_string(),
        c => c.to_string(),
    };
    let data_de = |linha: &Linha| rotulo_data(linha.campo_opcional(colunas.data_ultima_ocorrencia.as_ref()));
    let cidade_de = |linha: &Linha| match linha.campo_opcional(colunas.cidade.as_ref()) {
        "" => NAO_DISPONIVEL.to_string(),
        c => c.to_string(),
    };

    for linha in linhas {
        let codigo = linha.campo(ocorrencia);

        let (chave_a, chave_b, extra) = match visao {
            VisaoDetalhe::Codigo(alvo) if codigo == alvo.as_str() => (cidade_de(linha), data_de(linha), None),
            VisaoDetalhe::Projecao if codigo == CODIGO_ENTREGUE || codigo == CODIGO_EM_ROTA => {
                (cidade_de(linha), data_de(linha), None)
            }
            VisaoDetalhe::Insucessos if CODIGOS_INSUCESSO.contains(&codigo) => {
                (codigo.to_string(), data_de(linha), None)
            }
            VisaoDetalhe::SemPrazo => match avaliar_linha(linha, colunas, prazos) {
                Ok(avaliacao) if avaliacao.status == StatusPrazo::SemPrazo => {
                    let datas = avaliacao.datas;
                    let dias = diferenca_em_dias_corridos(datas.previsao, datas.manifesto);
                    let fim_de_semana =
                        tem_fim_de_semana_no_intervalo(datas.manifesto.date(), datas.previsao.date());
                    (
                        formatar_prazo(dias),
                        cidade_de(linha),
                        Some((avaliacao.prazo_ideal, fim_de_semana)),
                    )
                }
                _ => continue,
            },
            _ => continue,
        };

        let grupo = grupos
            .entry((chave_a.clone(), chave_b.clone()))
            .or_insert_with(|| GrupoDetalhe {
                chave_a,
                chave_b,
                ..Default::default()
            });
        grupo.quantidade += 1;
        grupo.ctrcs.push(ctrc_de(linha));

        if let Some((prazo_ideal, fim_de_semana)) = extra {
            if grupo.prazo_ideal_dias.is_none() {
                grupo.prazo_ideal_dias = Some(prazo_ideal);
                grupo.prazo_ideal = Some(formatar_prazo(i64::from(prazo_ideal)));
            }
            grupo.tem_fim_de_semana |= fim_de_semana;
        }
    }

    let mut lista: Vec<GrupoDetalhe> = grupos.into_values().collect();
    if *visao == VisaoDetalhe::SemPrazo {
        for grupo in &mut lista {
            grupo.prazo_ideal.get_or_insert_with(|| NAO_DISPONIVEL.to_string());
        }
    }
    lista
}

/// Datas legíveis viram `dd/mm/aaaa`; o restante é mantido (ou `N/A` se vazio).
fn rotulo_data(valor: &str) -> String {
    if valor.is_empty() {
        return NAO_DISPONIVEL.to_string();
    }
    parse_flexible_date(valor)
        .map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| valor.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CriterioOrdenacao {
    ChaveA,
    /// Compara como data quando ambos os valores são datas legíveis.
    ChaveB,
    Quantidade,
    PrazoIdeal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Direcao {
    #[default]
    Crescente,
    Decrescente,
}

/// Ordenação estável dos grupos.
pub fn ordenar_grupos(grupos: &mut [GrupoDetalhe], criterio: CriterioOrdenacao, direcao: Direcao) {
    grupos.sort_by(|a, b| {
        let ordem = match criterio {
            CriterioOrdenacao::ChaveA => a.chave_a.cmp(&b.chave_a),
            CriterioOrdenacao::ChaveB => comparar_datas(&a.chave_b, &b.chave_b),
            CriterioOrdenacao::Quantidade => a.quantidade.cmp(&b.quantidade),
            CriterioOrdenacao::PrazoIdeal => a.prazo_ideal_dias.cmp(&b.prazo_ideal_dias),
        };
        match direcao {
            Direcao::Crescente => ordem,
            Direcao::Decrescente => ordem.reverse(),
        }
    });
}

// Datas antes de textos, para manter a ordem total.
fn comparar_datas(a: &str, b: &str) -> Ordering {
    match (parse_flexible_date(a), parse_flexible_date(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
