use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    process::Command,
};
use tracing::info;

use crate::{
    AnaliseResult, CODIGOS_OFENSORES_PADRAO, Card, Cards, ConsultaMotorista, Contexto, DadosProcessados,
    FiltroSelecao, GrupoDetalhe, LinhaFrequencia, MetricaPorUnidade, MetricaUnidade, RankingOfensores,
    ResumoContagem, ResumoPlaca, ResumoSemMovimentacao, ResumoSemPrazo, Selecao, TipoCard, VisaoDetalhe,
    analisar_placas, calcular_cards, detalhar_unidade, metricas_por_unidade, ranking_ofensores,
    resumo_insucessos, resumo_sem_movimentacao, resumo_sem_prazo, tabela_de_frequencia,
    unidades_por_cidade,
};

/// Limpar a tela.
pub fn clear_screen(clear_screen: bool) -> AnaliseResult<()> {
    if clear_screen {
        if cfg!(target_os = "windows") {
            // No Windows, 'cls' é um comando interno do 'cmd'.
            Command::new("cmd").args(["/c", "cls"]).status()?;
        } else {
            Command::new("clear").status()?;
        }
    }

    Ok(())
}

/// Exibe a descrição e a versão do programa.
pub fn imprimir_versao_do_programa() {
    let descr = [
        "Este programa analisa arquivos de rastreamento de entregas (CSV, SSWWEB ou XLSX).",
        "O arquivo é lido em lotes e agregado por código de ocorrência, UF, unidade e cidade.",
        "São calculados: frequência dos códigos, cards de entrega, insucessos e sem movimentação.",
        "Também são analisados o desempenho por placa, os ofensores e os CTRCs sem prazo.",
    ];

    for line in &descr {
        println!(" {}", line);
    }

    println!("\n versão: {}\n", env!("CARGO_PKG_VERSION"));
}

pub fn fmt_milhares(n: usize) -> String {
    let s = n.to_string();
    let len = s.len();
    let mut result = String::with_capacity(len + len / 3);

    s.chars().enumerate().for_each(|(i, c)| {
        // Ponto a cada três dígitos contados a partir do fim
        if i > 0 && (len - i).is_multiple_of(3) {
            result.push('.');
        }
        result.push(c);
    });

    result
}

/// Percentual com uma casa decimal e vírgula: `33,3%`.
pub fn fmt_percentual(p: f64) -> String {
    format!("{p:.1}%").replace('.', ",")
}

/// Drill-down de uma unidade em uma visão.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetalheUnidade {
    pub unidade: String,
    pub visao: VisaoDetalhe,
    pub grupos: Vec<GrupoDetalhe>,
}

/// Todas as métricas para o filtro corrente (o que é impresso e exportado em JSON).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Painel {
    pub filtro: FiltroSelecao,
    pub total_linhas: usize,
    pub total_com_codigo: usize,
    /// Códigos selecionados, com percentual renormalizado.
    pub frequencia: Vec<LinhaFrequencia>,
    pub cards: Cards,
    pub sem_prazo: ResumoSemPrazo,
    pub card_sem_prazo: Card,
    pub insucessos: ResumoContagem,
    pub sem_movimentacao: ResumoSemMovimentacao,
    pub ofensores: RankingOfensores,
    /// Ranking restrito aos códigos padrão de ofensores.
    pub ofensores_padrao: RankingOfensores,
    pub placas: Vec<ResumoPlaca>,
    pub por_unidade: BTreeMap<&'static str, Vec<MetricaPorUnidade>>,
    pub unidades_por_cidade: BTreeMap<String, BTreeMap<String, String>>,
    /// Apenas para unidades selecionadas explicitamente.
    pub detalhes: Vec<DetalheUnidade>,
}

impl Painel {
    pub fn calcular(
        dados: &DadosProcessados,
        filtro: &FiltroSelecao,
        ctx: &Contexto,
        motoristas: &dyn ConsultaMotorista,
    ) -> Painel {
        let tabela = tabela_de_frequencia(dados, filtro);
        let sem_prazo = resumo_sem_prazo(dados, filtro, ctx.prazos);
        let ofensores = ranking_ofensores(dados, filtro, motoristas);
        let ofensores_padrao = ofensores.selecionar_codigos(&Selecao::from_lista(Some(CODIGOS_OFENSORES_PADRAO)));

        let metricas = [
            ("projecao", MetricaUnidade::Projecao),
            ("insucessos", MetricaUnidade::Insucessos),
            ("sem_movimentacao", MetricaUnidade::SemMovimentacao),
            ("sem_prazo", MetricaUnidade::SemPrazo),
        ];
        let por_unidade = metricas
            .into_iter()
            .map(|(nome, metrica)| (nome, metricas_por_unidade(dados, filtro, &metrica, ctx)))
            .collect();

        let detalhes = filtro
            .unidades
            .valor()
            .into_iter()
            .flatten()
            .flat_map(|unidade| {
                [VisaoDetalhe::Projecao, VisaoDetalhe::Insucessos, VisaoDetalhe::SemPrazo]
                    .into_iter()
                    .map(move |visao| DetalheUnidade {
                        unidade: unidade.clone(),
                        grupos: detalhar_unidade(dados, filtro, unidade, &visao, ctx.prazos),
                        visao,
                    })
            })
            .collect();

        Painel {
            filtro: filtro.clone(),
            total_linhas: dados.total_linhas(),
            total_com_codigo: tabela.total,
            frequencia: tabela.selecionadas(&filtro.codigos),
            cards: calcular_cards(&tabela, &filtro.codigos),
            card_sem_prazo: Card::new(TipoCard::SemPrazo, sem_prazo.quantidade, sem_prazo.percentual),
            sem_prazo,
            insucessos: resumo_insucessos(dados, filtro, ctx),
            sem_movimentacao: resumo_sem_movimentacao(dados, filtro),
            ofensores,
            ofensores_padrao,
            placas: analisar_placas(dados, filtro, motoristas),
            por_unidade,
            unidades_por_cidade: unidades_por_cidade(dados, filtro),
            detalhes,
        }
    }
}

pub fn exportar_json(painel: &Painel, path: &Path) -> AnaliseResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, painel)?;
    writer.flush()?;
    info!(arquivo = %path.display(), "métricas exportadas");
    println!(" ---> Métricas exportadas em JSON: <{}>\n", path.display());
    Ok(())
}

pub fn imprimir_resumo_da_carga(dados: &DadosProcessados, origem: &str) {
    println!(" --- Carga: {} ---", origem);
    println!(" Linhas processadas     = {:>9}", fmt_milhares(dados.meta.total_processado));
    println!(" Linhas com código      = {:>9}", fmt_milhares(dados.meta.total_com_codigo()));
    println!(" Códigos distintos      = {:>9}", fmt_milhares(dados.meta.frequencia.len()));
    println!(" UFs de entrega         = {:>9}", fmt_milhares(dados.meta.ufs.len()));
    println!(" Coluna alvo            : '{}'", dados.coluna_alvo);
    println!();
}

pub fn imprimir_painel(painel: &Painel, top: usize) {
    imprimir_frequencia(&painel.frequencia);
    imprimir_cards(painel);
    imprimir_metricas_por_unidade(&painel.por_unidade);
    imprimir_sem_prazo(&painel.sem_prazo);
    imprimir_sem_movimentacao(&painel.sem_movimentacao);
    imprimir_ofensores(&painel.ofensores, &painel.ofensores_padrao, top);
    imprimir_placas(&painel.placas, top);
    imprimir_detalhes(&painel.detalhes);
}

fn imprimir_frequencia(linhas: &[LinhaFrequencia]) {
    let max_len = linhas
        .iter()
        .map(|l| l.descricao.chars().count())
        .max()
        .unwrap_or_default();

    println!(" --- Frequência dos códigos de ocorrência ---");

    let mut running_sum = 0;
    for l in linhas {
        running_sum += l.quantidade;
        println!(
            " Código {:>4} ({:<max_len$}) = {:>9} {:>7} ( soma acumulada = {:>9} )",
            l.codigo,
            l.descricao,
            fmt_milhares(l.quantidade),
            fmt_percentual(l.percentual),
            fmt_milhares(running_sum)
        );
    }
    println!();
}

fn imprimir_cards(painel: &Painel) {
    let cards = &painel.cards;
    let linhas = [
        ("Projeção", &cards.projecao),
        ("Entregues", &cards.entregues),
        ("Em rota", &cards.em_rota),
        ("Em piso", &cards.em_piso),
        ("Sem prazo", &painel.card_sem_prazo),
    ];

    println!(" --- Indicadores ---");
    for (nome, card) in linhas {
        println!(
            " {:<10} = {:>9} {:>7} [{:?}]",
            nome,
            fmt_milhares(card.quantidade),
            fmt_percentual(card.percentual),
            card.indicador
        );
    }

    let ins = &painel.insucessos;
    println!(
        " {:<10} = {:>9} {:>7} (de {} linhas)",
        "Insucessos",
        fmt_milhares(ins.quantidade),
        fmt_percentual(ins.percentual),
        fmt_milhares(ins.total)
    );
    println!();
}

fn imprimir_metricas_por_unidade(por_unidade: &BTreeMap<&'static str, Vec<MetricaPorUnidade>>) {
    for (nome, lista) in por_unidade {
        if lista.is_empty() {
            continue;
        }
        println!(" --- Por unidade: {} ---", nome);
        for m in lista {
            println!(
                " {:<12} = {:>9} de {:>9} {:>7}",
                m.unidade,
                fmt_milhares(m.quantidade),
                fmt_milhares(m.total),
                fmt_percentual(m.percentual)
            );
        }
        println!();
    }
}

fn imprimir_sem_prazo(resumo: &ResumoSemPrazo) {
    println!(" --- Sem prazo ---");
    println!(
        " Atrasadas = {:>9} de {:>9} classificadas {:>7}",
        fmt_milhares(resumo.quantidade),
        fmt_milhares(resumo.total_classificado),
        fmt_percentual(resumo.percentual)
    );
    if resumo.sem_prazo_cadastrado > 0 {
        println!(" Linhas sem prazo cadastrado: {}", fmt_milhares(resumo.sem_prazo_cadastrado));
    }
    for u in &resumo.unidades {
        println!("  -> {:<12} {:<2} = {:>9}", u.unidade, u.uf, fmt_milhares(u.total));
    }
    println!();
}

fn imprimir_sem_movimentacao(resumo: &ResumoSemMovimentacao) {
    println!(" --- Sem movimentação (código 50): {} ---", fmt_milhares(resumo.quantidade));
    for base in &resumo.bases {
        println!("  -> {:<12} {:<2} = {:>9}", base.unidade, base.uf, fmt_milhares(base.total));
    }
    println!();
}

fn imprimir_ofensores(ranking: &RankingOfensores, padrao: &RankingOfensores, top: usize) {
    println!(
        " --- Ofensores: {} falhas em {} linhas ({}) ---",
        fmt_milhares(ranking.total_insucessos),
        fmt_milhares(ranking.total_linhas),
        fmt_percentual(ranking.percentual_insucesso)
    );
    println!(
        " Apenas códigos padrão: {} falhas ({})",
        fmt_milhares(padrao.total_insucessos),
        fmt_percentual(padrao.percentual_insucesso)
    );

    println!("\n Por código:");
    for c in ranking.codigos.iter().take(top) {
        println!(
            "  {:>4} {:<16} = {:>9} {:>7}",
            c.codigo,
            c.descricao,
            fmt_milhares(c.quantidade),
            fmt_percentual(c.percentual)
        );
    }

    println!("\n Por unidade ({} no total):", ranking.total_unidades);
    for u in ranking.unidades.iter().take(top) {
        println!(
            "  {:<12} = {:>9} {:>7}",
            u.unidade,
            fmt_milhares(u.quantidade),
            fmt_percentual(u.percentual)
        );
    }

    println!("\n Por motorista ({} no total):", ranking.total_motoristas);
    for m in ranking.motoristas.iter().take(top) {
        println!(
            "  {:<30} {:<8} {:<12} = {:>9} {:>7}",
            m.motorista,
            m.placa,
            m.unidade,
            fmt_milhares(m.quantidade),
            fmt_percentual(m.percentual)
        );
    }
    println!();
}

fn imprimir_placas(placas: &[ResumoPlaca], top: usize) {
    if placas.is_empty() {
        return;
    }
    println!(" --- Desempenho por placa ({} placas) ---", fmt_milhares(placas.len()));
    for p in placas.iter().take(top) {
        println!(
            " {:<8} {:<30} total = {:>7} | entregues {:>7} | em rota {:>7} | insucessos {:>7} | {}",
            p.placa,
            p.motorista,
            fmt_milhares(p.total),
            fmt_percentual(p.entregues.percentual),
            fmt_percentual(p.em_rota.percentual),
            fmt_percentual(p.insucessos.percentual),
            p.cidade_principal
        );
    }
    println!();
}

fn imprimir_detalhes(detalhes: &[DetalheUnidade]) {
    for d in detalhes.iter().filter(|d| !d.grupos.is_empty()) {
        println!(" --- Detalhamento {} ({:?}) ---", d.unidade, d.visao);
        for g in &d.grupos {
            let prazo = g
                .prazo_ideal
                .as_deref()
                .map(|p| format!(" (prazo ideal: {p})"))
                .unwrap_or_default();
            let fim_de_semana = if g.tem_fim_de_semana { " [fim de semana]" } else { "" };
            println!(
                "  {} - {} = {:>7}{}{}",
                g.chave_a,
                g.chave_b,
                fmt_milhares(g.quantidade),
                prazo,
                fim_de_semana
            );
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separador_de_milhares() {
        assert_eq!(fmt_milhares(0), "0");
        assert_eq!(fmt_milhares(999), "999");
        assert_eq!(fmt_milhares(1000), "1.000");
        assert_eq!(fmt_milhares(1234567), "1.234.567");
    }

    #[test]
    fn percentual_com_virgula() {
        assert_eq!(fmt_percentual(100.0 / 3.0), "33,3%");
        assert_eq!(fmt_percentual(0.0), "0,0%");
    }
}
