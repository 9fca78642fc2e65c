//! Métricas sobre o conjunto completo já filtrado: tabela de frequência,
//! cards, métricas por unidade, insucessos e sem movimentação.
//!
//! Todas as funções são puras e não alteram [`DadosProcessados`].
//! Coluna necessária não resolvida resulta em resultado vazio (ou zerado).

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    CIDADE_NAO_INFORMADA, CODIGO_EM_PISO, CODIGO_EM_ROTA, CODIGO_ENTREGUE, CODIGO_SEM_MOVIMENTACAO,
    CODIGOS_INSUCESSO, ConsultaPrazo, DadosProcessados, FiltroSelecao, Linha, ResultadoAgregacao,
    Selecao, buscar_unidades, datas_da_linha, esta_sem_prazo, filtrar_por_local,
    get_status_ocorrencia, parse_flexible_date,
};

/// `parte / total * 100`, ou zero quando não há total.
///
/// ```
/// use analise_ocorrencias::percentual;
///
/// assert_eq!(percentual(1, 4), 25.0);
/// assert_eq!(percentual(3, 0), 0.0);
/// ```
pub fn percentual(parte: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        parte as f64 / total as f64 * 100.0
    }
}

/// Quantidade de linhas por (unidade, UF).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContagemUnidade {
    pub unidade: String,
    pub uf: String,
    pub total: usize,
}

impl ContagemUnidade {
    /// Ordena por total decrescente e depois por unidade.
    pub fn ordenar(contagem: BTreeMap<(String, String), usize>) -> Vec<ContagemUnidade> {
        let mut lista: Vec<ContagemUnidade> = contagem
            .into_iter()
            .map(|((unidade, uf), total)| ContagemUnidade { unidade, uf, total })
            .collect();
        lista.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.unidade.cmp(&b.unidade)));
        lista
    }
}

/// Agregação restrita à UF e às unidades do filtro.
///
/// Sem filtro de local, reaproveita o resultado calculado na ingestão.
pub fn resumo_filtrado(dados: &DadosProcessados, filtro: &FiltroSelecao) -> ResultadoAgregacao {
    if filtro.uf.is_todas() && filtro.unidades.is_todas() {
        return dados.meta.clone();
    }

    let indice_alvo = dados.colunas.ocorrencia.as_ref().map(|c| c.indice);
    filtrar_por_local(&dados.completo, &dados.colunas, filtro)
        .into_iter()
        .fold(ResultadoAgregacao::default(), |mut acc, linha| {
            acc.registrar(linha, &dados.colunas, indice_alvo);
            acc
        })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinhaFrequencia {
    pub codigo: String,
    pub descricao: &'static str,
    pub quantidade: usize,
    pub percentual: f64,
}

/// Frequência dos códigos disponíveis no escopo do filtro.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TabelaFrequencia {
    /// Ordenadas por quantidade decrescente; percentual sobre `total`.
    pub linhas: Vec<LinhaFrequencia>,
    /// Linhas com código preenchido.
    pub total: usize,
}

impl TabelaFrequencia {
    pub fn new(resumo: &ResultadoAgregacao) -> Self {
        let total = resumo.total_com_codigo();
        let mut linhas: Vec<LinhaFrequencia> = resumo
            .frequencia
            .iter()
            .map(|(codigo, &quantidade)| LinhaFrequencia {
                codigo: codigo.clone(),
                descricao: get_status_ocorrencia(codigo),
                quantidade,
                percentual: percentual(quantidade, total),
            })
            .collect();
        linhas.sort_by(|a, b| b.quantidade.cmp(&a.quantidade).then_with(|| a.codigo.cmp(&b.codigo)));
        TabelaFrequencia { linhas, total }
    }

    pub fn codigos(&self) -> Vec<&str> {
        self.linhas.iter().map(|l| l.codigo.as_str()).collect()
    }

    pub fn quantidade(&self, codigo: &str) -> usize {
        self.linhas
            .iter()
            .find(|l| l.codigo == codigo)
            .map(|l| l.quantidade)
            .unwrap_or_default()
    }

    fn selecionadas_iter<'a>(
        &'a self,
        codigos: &'a Selecao<BTreeSet<String>>,
    ) -> impl Iterator<Item = &'a LinhaFrequencia> {
        self.linhas.iter().filter(|l| codigos.aceita(&l.codigo))
    }

    /// Soma das quantidades dos códigos selecionados.
    pub fn total_selecionado(&self, codigos: &Selecao<BTreeSet<String>>) -> usize {
        self.selecionadas_iter(codigos).map(|l| l.quantidade).sum()
    }

    /// A seleção deixa de fora algum código disponível.
    pub fn eh_subconjunto_estrito(&self, codigos: &Selecao<BTreeSet<String>>) -> bool {
        self.selecionadas_iter(codigos).count() < self.linhas.len()
    }

    /// Linhas dos códigos selecionados, com percentual renormalizado
    /// (a seleção soma 100%).
    ///
    /// ```
    /// use analise_ocorrencias::{ResultadoAgregacao, Selecao, TabelaFrequencia};
    ///
    /// let mut meta = ResultadoAgregacao::default();
    /// meta.frequencia.extend([("1".into(), 6), ("59".into(), 2), ("26".into(), 2)]);
    ///
    /// let tabela = TabelaFrequencia::new(&meta);
    /// assert_eq!(tabela.linhas[0].percentual, 60.0);
    ///
    /// let sel = Selecao::from_lista(Some(["1", "59"]));
    /// let linhas = tabela.selecionadas(&sel);
    /// assert_eq!(linhas[0].percentual, 75.0);
    /// assert_eq!(linhas[1].percentual, 25.0);
    /// ```
    pub fn selecionadas(&self, codigos: &Selecao<BTreeSet<String>>) -> Vec<LinhaFrequencia> {
        let total = self.total_selecionado(codigos);
        self.selecionadas_iter(codigos)
            .map(|l| LinhaFrequencia {
                percentual: percentual(l.quantidade, total),
                ..l.clone()
            })
            .collect()
    }

    /// Quantidade e percentual de um grupo de códigos para os cards.
    ///
    /// Se a seleção é um subconjunto estrito dos códigos disponíveis, o percentual
    /// é relativo à seleção e códigos fora dela contam 0%. Caso contrário, é o
    /// percentual simples.
    fn valor_card(&self, grupo: &[&str], codigos: &Selecao<BTreeSet<String>>) -> (usize, f64) {
        let quantidade = grupo.iter().map(|c| self.quantidade(c)).sum();

        let pct = if self.eh_subconjunto_estrito(codigos) {
            let selecionados: usize = grupo
                .iter()
                .filter(|c| codigos.aceita(c))
                .map(|c| self.quantidade(c))
                .sum();
            percentual(selecionados, self.total_selecionado(codigos))
        } else {
            percentual(quantidade, self.total)
        };

        (quantidade, pct)
    }
}

/// Tabela de frequência no escopo de UF/unidades do filtro.
pub fn tabela_de_frequencia(dados: &DadosProcessados, filtro: &FiltroSelecao) -> TabelaFrequencia {
    if dados.colunas.ocorrencia.is_none() {
        return TabelaFrequencia::default();
    }
    TabelaFrequencia::new(&resumo_filtrado(dados, filtro))
}

/// Tipo de indicador, para as faixas de cor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TipoCard {
    Projecao,
    Entregues,
    EmRota,
    EmPiso,
    SemPrazo,
    Insucessos,
    SemMovimentacao,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Indicador {
    Verde,
    Amarelo,
    Vermelho,
    Neutro,
}

impl TipoCard {
    /// Faixa de cor para o percentual.
    ///
    /// ```
    /// use analise_ocorrencias::{Indicador, TipoCard};
    ///
    /// assert_eq!(TipoCard::Projecao.indicador(97.0), Indicador::Verde);
    /// assert_eq!(TipoCard::Entregues.indicador(95.0), Indicador::Amarelo);
    /// assert_eq!(TipoCard::EmPiso.indicador(1.5), Indicador::Vermelho);
    /// assert_eq!(TipoCard::Insucessos.indicador(50.0), Indicador::Neutro);
    /// ```
    pub fn indicador(self, pct: f64) -> Indicador {
        let faixa = |verde: bool, amarelo: bool| {
            if verde {
                Indicador::Verde
            } else if amarelo {
                Indicador::Amarelo
            } else {
                Indicador::Vermelho
            }
        };

        match self {
            TipoCard::Projecao => faixa(pct >= 97.0, pct >= 95.0),
            TipoCard::Entregues => faixa(pct >= 96.5, pct >= 94.0),
            TipoCard::EmRota => faixa(pct == 0.0, pct <= 5.0),
            TipoCard::EmPiso => faixa(pct == 0.0, pct <= 1.0),
            TipoCard::SemPrazo => faixa(pct <= 2.0, pct <= 5.0),
            TipoCard::Insucessos | TipoCard::SemMovimentacao => Indicador::Neutro,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Card {
    pub tipo: TipoCard,
    pub quantidade: usize,
    pub percentual: f64,
    pub indicador: Indicador,
}

impl Card {
    pub fn new(tipo: TipoCard, quantidade: usize, percentual: f64) -> Self {
        Card {
            tipo,
            quantidade,
            percentual,
            indicador: tipo.indicador(percentual),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Cards {
    pub entregues: Card,
    pub em_rota: Card,
    pub em_piso: Card,
    /// Entregues + em rota.
    pub projecao: Card,
}

pub fn calcular_cards(tabela: &TabelaFrequencia, codigos: &Selecao<BTreeSet<String>>) -> Cards {
    let card = |tipo, grupo: &[&str]| {
        let (quantidade, pct) = tabela.valor_card(grupo, codigos);
        Card::new(tipo, quantidade, pct)
    };

    Cards {
        entregues: card(TipoCard::Entregues, &[CODIGO_ENTREGUE]),
        em_rota: card(TipoCard::EmRota, &[CODIGO_EM_ROTA]),
        em_piso: card(TipoCard::EmPiso, &[CODIGO_EM_PISO]),
        projecao: card(TipoCard::Projecao, &[CODIGO_ENTREGUE, CODIGO_EM_ROTA]),
    }
}

/// Restrição dos insucessos pela data da última ocorrência.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum FiltroDia {
    #[default]
    Todos,
    Hoje,
    ExcetoHoje,
}

impl FiltroDia {
    /// Com o filtro ativo, linhas sem data são rejeitadas.
    pub fn aceita(self, data: Option<NaiveDate>, hoje: NaiveDate) -> bool {
        match (self, data) {
            (FiltroDia::Todos, _) => true,
            (_, None) => false,
            (FiltroDia::Hoje, Some(d)) => d == hoje,
            (FiltroDia::ExcetoHoje, Some(d)) => d != hoje,
        }
    }
}

/// Parâmetros externos das métricas.
#[derive(Clone, Copy)]
pub struct Contexto<'a> {
    pub prazos: &'a dyn ConsultaPrazo,
    pub dia: FiltroDia,
    pub hoje: NaiveDate,
}

impl Contexto<'_> {
    fn aceita_dia(&self, linha: &Linha, dados: &DadosProcessados) -> bool {
        if self.dia == FiltroDia::Todos {
            return true;
        }
        let data = parse_flexible_date(linha.campo_opcional(dados.colunas.data_ultima_ocorrencia.as_ref()))
            .map(|d| d.date());
        self.dia.aceita(data, self.hoje)
    }
}

/// Métrica calculada unidade a unidade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MetricaUnidade {
    /// Um código específico, sobre as linhas com código selecionado.
    Codigo(String),
    /// Entregues + em rota, sobre as linhas com código selecionado.
    Projecao,
    /// Códigos de insucesso, sobre as linhas com código (respeita o filtro de dia).
    Insucessos,
    /// Código 50, sobre as linhas com código.
    SemMovimentacao,
    /// Atrasadas, sobre as linhas com previsão e manifesto legíveis.
    SemPrazo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricaPorUnidade {
    pub unidade: String,
    pub quantidade: usize,
    pub total: usize,
    pub percentual: f64,
}

/// Calcula a métrica para cada unidade do filtro (ou, sem seleção, para todas
/// as unidades da UF). Unidades sem nenhuma linha no denominador ficam de fora.
/// Ordenado por percentual decrescente.
pub fn metricas_por_unidade(
    dados: &DadosProcessados,
    filtro: &FiltroSelecao,
    metrica: &MetricaUnidade,
    ctx: &Contexto,
) -> Vec<MetricaPorUnidade> {
    let (Some(ocorrencia), Some(col_unidade)) =
        (dados.colunas.ocorrencia.as_ref(), dados.colunas.unidade.as_ref())
    else {
        return Vec::new();
    };

    let unidades: Vec<String> = match &filtro.unidades {
        Selecao::Apenas(unidades) => unidades.iter().cloned().collect(),
        Selecao::Todas => buscar_unidades(&dados.meta, &filtro.uf, ""),
    };

    // Uma única passada pelo conjunto, agrupando as linhas por unidade
    let mut por_unidade: BTreeMap<&str, Vec<&Linha>> =
        unidades.iter().map(|u| (u.as_str(), Vec::new())).collect();
    for linha in filtrar_por_local(&dados.completo, &dados.colunas, filtro) {
        if let Some(grupo) = por_unidade.get_mut(linha.campo(col_unidade)) {
            grupo.push(linha);
        }
    }

    let mut resultado: Vec<MetricaPorUnidade> = por_unidade
        .into_iter()
        .filter_map(|(unidade, linhas)| {
            let com_codigo = || linhas.iter().filter(|l| !l.campo(ocorrencia).is_empty());

            let (quantidade, total) = match metrica {
                MetricaUnidade::Codigo(codigo) => {
                    let base: Vec<&&Linha> =
                        com_codigo().filter(|l| filtro.codigos.aceita(l.campo(ocorrencia))).collect();
                    let qtd = base.iter().filter(|l| l.campo(ocorrencia) == codigo.as_str()).count();
                    (qtd, base.len())
                }
                MetricaUnidade::Projecao => {
                    let base: Vec<&&Linha> =
                        com_codigo().filter(|l| filtro.codigos.aceita(l.campo(ocorrencia))).collect();
                    let qtd = base
                        .iter()
                        .filter(|l| matches!(l.campo(ocorrencia), CODIGO_ENTREGUE | CODIGO_EM_ROTA))
                        .count();
                    (qtd, base.len())
                }
                MetricaUnidade::Insucessos => {
                    let base: Vec<&&Linha> = com_codigo().filter(|l| ctx.aceita_dia(l, dados)).collect();
                    let qtd = base
                        .iter()
                        .filter(|l| CODIGOS_INSUCESSO.contains(&l.campo(ocorrencia)))
                        .count();
                    (qtd, base.len())
                }
                MetricaUnidade::SemMovimentacao => {
                    let total = com_codigo().count();
                    let qtd = com_codigo()
                        .filter(|l| l.campo(ocorrencia) == CODIGO_SEM_MOVIMENTACAO)
                        .count();
                    (qtd, total)
                }
                MetricaUnidade::SemPrazo => {
                    let validas: Vec<&&Linha> = linhas
                        .iter()
                        .filter(|l| datas_da_linha(l, &dados.colunas).is_some())
                        .collect();
                    let qtd = validas
                        .iter()
                        .filter(|l| esta_sem_prazo(l, &dados.colunas, ctx.prazos))
                        .count();
                    (qtd, validas.len())
                }
            };

            (total > 0).then(|| MetricaPorUnidade {
                unidade: unidade.to_string(),
                quantidade,
                total,
                percentual: percentual(quantidade, total),
            })
        })
        .collect();

    resultado.sort_by(|a, b| {
        b.percentual
            .total_cmp(&a.percentual)
            .then_with(|| a.unidade.cmp(&b.unidade))
    });
    resultado
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResumoContagem {
    pub quantidade: usize,
    pub total: usize,
    pub percentual: f64,
}

/// Insucessos sobre as linhas com código do escopo (UF, unidades e filtro de dia).
///
/// Mesmo denominador de [`MetricaUnidade::Insucessos`].
pub fn resumo_insucessos(dados: &DadosProcessados, filtro: &FiltroSelecao, ctx: &Contexto) -> ResumoContagem {
    let Some(ocorrencia) = dados.colunas.ocorrencia.as_ref() else {
        return ResumoContagem::default();
    };

    let (quantidade, total) = filtrar_por_local(&dados.completo, &dados.colunas, filtro)
        .into_iter()
        .filter(|l| !l.campo(ocorrencia).is_empty())
        .filter(|l| ctx.aceita_dia(l, dados))
        .fold((0, 0), |(qtd, total), l| {
            let insucesso = CODIGOS_INSUCESSO.contains(&l.campo(ocorrencia));
            (qtd + usize::from(insucesso), total + 1)
        });

    ResumoContagem {
        quantidade,
        total,
        percentual: percentual(quantidade, total),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResumoSemMovimentacao {
    pub quantidade: usize,
    pub bases: Vec<ContagemUnidade>,
}

/// Linhas com código 50 e unidade preenchida, por base.
pub fn resumo_sem_movimentacao(dados: &DadosProcessados, filtro: &FiltroSelecao) -> ResumoSemMovimentacao {
    let colunas = &dados.colunas;
    let (Some(ocorrencia), Some(col_unidade)) = (colunas.ocorrencia.as_ref(), colunas.unidade.as_ref())
    else {
        return ResumoSemMovimentacao::default();
    };

    let mut por_base: BTreeMap<(String, String), usize> = BTreeMap::new();
    for linha in filtrar_por_local(&dados.completo, colunas, filtro) {
        let unidade = linha.campo(col_unidade);
        if linha.campo(ocorrencia) != CODIGO_SEM_MOVIMENTACAO || unidade.is_empty() {
            continue;
        }
        let uf = linha.campo_opcional(colunas.uf.as_ref());
        *por_base.entry((unidade.to_string(), uf.to_string())).or_insert(0) += 1;
    }

    let quantidade = por_base.values().sum();
    ResumoSemMovimentacao {
        quantidade,
        bases: ContagemUnidade::ordenar(por_base),
    }
}

/// código -> cidade -> unidade (a última linha vista vence).
pub fn unidades_por_cidade(
    dados: &DadosProcessados,
    filtro: &FiltroSelecao,
) -> BTreeMap<String, BTreeMap<String, String>> {
    let colunas = &dados.colunas;
    let (Some(ocorrencia), Some(col_cidade)) = (colunas.ocorrencia.as_ref(), colunas.cidade.as_ref()) else {
        return BTreeMap::new();
    };

    let mut mapa: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for linha in filtrar_por_local(&dados.completo, colunas, filtro) {
        let (codigo, cidade) = (linha.campo(ocorrencia), linha.campo(col_cidade));
        if codigo.is_empty() || cidade.is_empty() {
            continue;
        }
        let unidade = match linha.campo_opcional(colunas.unidade.as_ref()) {
            "" => CIDADE_NAO_INFORMADA,
            u => u,
        };
        mapa.entry(codigo.to_string())
            .or_default()
            .insert(cidade.to_string(), unidade.to_string());
    }
    mapa
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{COLUNA_ALVO, Cabecalho, reduce};
    use std::sync::Arc;

    const CABECALHO: [&str; 7] = [
        "Cidade de Entrega",
        "UF de Entrega",
        "Unidade Receptora",
        COLUNA_ALVO,
        "Data da Ultima Ocorrencia",
        "Previsao de Entrega",
        "Data do Ultimo Manifesto",
    ];

    fn montar(linhas: &[[&str; 7]]) -> DadosProcessados {
        let cab = Arc::new(Cabecalho::new(CABECALHO));
        let linhas: Vec<Linha> = linhas
            .iter()
            .map(|v| Linha::new(cab.clone(), v.iter().map(|s| s.to_string()).collect()))
            .collect();
        let meta = reduce(&linhas, COLUNA_ALVO);
        DadosProcessados::new(linhas, meta, COLUNA_ALVO.to_string(), 10)
    }

    fn hoje() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn sem_prazos(_: &str, _: &str) -> Option<u32> {
        None
    }

    fn ctx(dia: FiltroDia) -> Contexto<'static> {
        Contexto {
            prazos: &sem_prazos,
            dia,
            hoje: hoje(),
        }
    }

    fn exemplo() -> DadosProcessados {
        montar(&[
            ["Blumenau", "SC", "BLU", "1", "15/03/2024", "", ""],
            ["Blumenau", "SC", "BLU", "1", "15/03/2024", "", ""],
            ["Gaspar", "SC", "BLU", "59", "14/03/2024", "", ""],
            ["Gaspar", "SC", "BLU", "26", "15/03/2024", "", ""],
            ["Joinville", "SC", "JOI", "26", "14/03/2024", "", ""],
            ["Joinville", "SC", "JOI", "50", "", "", ""],
            ["Curitiba", "PR", "CWB", "82", "15/03/2024", "", ""],
            ["Curitiba", "PR", "CWB", "", "", "", ""],
        ])
    }

    #[test]
    fn frequencia_renormaliza_subconjunto() {
        let d = exemplo();
        let tabela = tabela_de_frequencia(&d, &FiltroSelecao::default());
        assert_eq!(tabela.total, 7);
        assert_eq!(tabela.linhas[0].codigo, "1");

        let sel = Selecao::from_lista(Some(["1", "26"]));
        let soma: f64 = tabela.selecionadas(&sel).iter().map(|l| l.percentual).sum();
        assert!((soma - 100.0).abs() < 1e-9);
        assert!(tabela.eh_subconjunto_estrito(&sel));
        assert!(!tabela.eh_subconjunto_estrito(&Selecao::Todas));
    }

    #[test]
    fn frequencia_por_uf() {
        let d = exemplo();
        let filtro = FiltroSelecao {
            uf: Selecao::Apenas("PR".into()),
            ..Default::default()
        };
        let tabela = tabela_de_frequencia(&d, &filtro);
        assert_eq!(tabela.codigos(), ["82"]);
        assert_eq!(tabela.total, 1);
    }

    #[test]
    fn cards_seguem_a_selecao() {
        let d = exemplo();
        let tabela = tabela_de_frequencia(&d, &FiltroSelecao::default());

        let cards = calcular_cards(&tabela, &Selecao::Todas);
        assert_eq!(cards.projecao.quantidade, 3);
        assert!((cards.projecao.percentual - 300.0 / 7.0).abs() < 1e-9);

        // Código 59 fora da seleção: conta 0% mas a quantidade continua
        let sel = Selecao::from_lista(Some(["1", "26"]));
        let cards = calcular_cards(&tabela, &sel);
        assert_eq!(cards.em_rota.quantidade, 1);
        assert_eq!(cards.em_rota.percentual, 0.0);
        assert_eq!(cards.em_rota.indicador, Indicador::Verde);
        assert_eq!(cards.entregues.percentual, 50.0);
        assert_eq!(cards.projecao.percentual, 50.0);
        assert_eq!(cards.projecao.indicador, Indicador::Vermelho);
    }

    #[test]
    fn metrica_por_codigo_e_projecao() {
        let d = exemplo();
        let filtro = FiltroSelecao {
            uf: Selecao::Apenas("SC".into()),
            ..Default::default()
        };
        let r = metricas_por_unidade(&d, &filtro, &MetricaUnidade::Projecao, &ctx(FiltroDia::Todos));
        assert_eq!(r.len(), 2);
        assert_eq!((r[0].unidade.as_str(), r[0].quantidade, r[0].total), ("BLU", 3, 4));
        assert_eq!((r[1].unidade.as_str(), r[1].quantidade), ("JOI", 0));

        let r = metricas_por_unidade(
            &d,
            &filtro,
            &MetricaUnidade::Codigo("26".into()),
            &ctx(FiltroDia::Todos),
        );
        assert_eq!(r[0].unidade, "JOI");
        assert_eq!(r[0].percentual, 50.0);
    }

    #[test]
    fn insucessos_com_filtro_de_dia() {
        let d = exemplo();
        let filtro = FiltroSelecao::default();

        let todos = resumo_insucessos(&d, &filtro, &ctx(FiltroDia::Todos));
        // A linha de CWB sem código fica fora do denominador
        assert_eq!((todos.quantidade, todos.total), (2, 7));

        let hoje = resumo_insucessos(&d, &filtro, &ctx(FiltroDia::Hoje));
        assert_eq!((hoje.quantidade, hoje.total), (1, 4));

        let antes = resumo_insucessos(&d, &filtro, &ctx(FiltroDia::ExcetoHoje));
        assert_eq!((antes.quantidade, antes.total), (1, 2));

        let r = metricas_por_unidade(&d, &filtro, &MetricaUnidade::Insucessos, &ctx(FiltroDia::Hoje));
        let joi = r.iter().find(|m| m.unidade == "JOI");
        assert!(joi.is_none(), "JOI não tem insucesso datado de hoje");
    }

    #[test]
    fn totais_globais_batem_com_a_soma_por_unidade() {
        let d = exemplo();
        let filtro = FiltroSelecao::default();
        let contexto = ctx(FiltroDia::Todos);

        let soma = |metrica: &MetricaUnidade| {
            metricas_por_unidade(&d, &filtro, metrica, &contexto)
                .iter()
                .fold((0, 0), |(qtd, total), m| (qtd + m.quantidade, total + m.total))
        };

        let global = resumo_insucessos(&d, &filtro, &contexto);
        assert_eq!(soma(&MetricaUnidade::Insucessos), (global.quantidade, global.total));

        let (sem_movimentacao, _) = soma(&MetricaUnidade::SemMovimentacao);
        assert_eq!(sem_movimentacao, resumo_sem_movimentacao(&d, &filtro).quantidade);
    }

    #[test]
    fn unidades_selecionadas_fora_da_uf_ficam_de_fora() {
        let d = exemplo();
        let filtro = FiltroSelecao {
            uf: Selecao::Apenas("SC".into()),
            unidades: Selecao::from_lista(Some(["BLU", "CWB", "XYZ"])),
            codigos: Selecao::Todas,
        };
        let r = metricas_por_unidade(&d, &filtro, &MetricaUnidade::SemMovimentacao, &ctx(FiltroDia::Todos));
        assert_eq!(r.len(), 1);
        assert_eq!((r[0].unidade.as_str(), r[0].quantidade, r[0].total), ("BLU", 0, 4));
    }

    #[test]
    fn sem_movimentacao_e_unidades_por_cidade() {
        let d = exemplo();
        let filtro = FiltroSelecao::default();

        let r = resumo_sem_movimentacao(&d, &filtro);
        assert_eq!(r.quantidade, 1);
        assert_eq!(r.bases[0].unidade, "JOI");
        assert_eq!(r.bases[0].uf, "SC");

        let mapa = unidades_por_cidade(&d, &filtro);
        assert_eq!(mapa["26"]["Gaspar"], "BLU");
        assert_eq!(mapa["26"]["Joinville"], "JOI");
        assert!(!mapa.contains_key(""));
    }

    #[test]
    fn sem_prazo_usa_linhas_com_datas_validas() {
        let d = montar(&[
            ["Blumenau", "SC", "BLU", "1", "", "15/03/2024", "15/03/2024"],
            ["Blumenau", "SC", "BLU", "1", "", "15/03/2024", "08/03/2024"],
            ["Blumenau", "SC", "BLU", "1", "", "", "08/03/2024"],
        ]);
        let prazos = |_: &str, _: &str| Some(3u32);
        let contexto = Contexto {
            prazos: &prazos,
            dia: FiltroDia::Todos,
            hoje: hoje(),
        };
        let r = metricas_por_unidade(&d, &FiltroSelecao::default(), &MetricaUnidade::SemPrazo, &contexto);
        assert_eq!((r[0].quantidade, r[0].total), (1, 2));
    }

    #[test]
    fn coluna_ausente_zera_metricas() {
        let mut d = exemplo();
        d.colunas.ocorrencia = None;
        assert_eq!(tabela_de_frequencia(&d, &FiltroSelecao::default()), TabelaFrequencia::default());
        assert!(
            metricas_por_unidade(&d, &FiltroSelecao::default(), &MetricaUnidade::Projecao, &ctx(FiltroDia::Todos))
                .is_empty()
        );
        assert_eq!(resumo_insucessos(&d, &FiltroSelecao::default(), &ctx(FiltroDia::Todos)).total, 0);
    }
}
