// --- Tabelas de Referência ---

/// Nome exato da coluna alvo (sem acentos, como exportado pelo SSW).
pub const COLUNA_ALVO: &str = "Codigo da Ultima Ocorrencia";

/// Posição da coluna alvo quando o nome não é encontrado (coluna 33, índice 32).
pub const POSICAO_COLUNA_ALVO: usize = 32;

// Posições fixas (0-based) usadas quando o cabeçalho não identifica a coluna.
// Dependem da versão do leiaute de exportação: se a ordem das colunas mudar,
// estes valores precisam ser revistos.
pub const POSICAO_CTRC: usize = 1; // B
pub const POSICAO_CIDADE: usize = 49; // AX
pub const POSICAO_UF: usize = 50; // AY
pub const POSICAO_UNIDADE: usize = 52; // BA
pub const POSICAO_ULTIMO_MANIFESTO: usize = 85; // CH
pub const POSICAO_PLACA: usize = 90; // CM
pub const POSICAO_DATA_ULTIMA_OCORRENCIA: usize = 93; // CP
pub const POSICAO_PREVISAO_ENTREGA: usize = 97; // CT

/// Tamanho padrão do lote enviado ao agregador.
pub const TAMANHO_LOTE_PADRAO: usize = 10_000;

/// Quantidade de linhas mantidas como amostra para a interface.
pub const TAMANHO_AMOSTRA_PADRAO: usize = 100;

pub const CODIGO_ENTREGUE: &str = "1";
pub const CODIGO_EM_ROTA: &str = "59";
pub const CODIGO_EM_PISO: &str = "82";
pub const CODIGO_SEM_MOVIMENTACAO: &str = "50";

/// Códigos somados no card "Insucessos".
pub const CODIGOS_INSUCESSO: [&str; 10] = ["26", "18", "46", "23", "25", "27", "28", "65", "66", "33"];

/// Códigos pré-selecionados na tabela de frequência.
pub const CODIGOS_SELECIONADOS_PADRAO: [&str; 22] = [
    "1", "6", "18", "23", "25", "26", "27", "28", "30", "33", "34", "46", "48", "50", "58", "59",
    "65", "67", "71", "75", "82", "97",
];

/// Códigos padrão da análise de ofensores.
pub const CODIGOS_OFENSORES_PADRAO: [&str; 11] =
    ["46", "25", "26", "27", "28", "18", "30", "6", "23", "33", "50"];

/// Resposta do diretório de motoristas quando a placa não é conhecida.
pub const MOTORISTA_NAO_ENCONTRADO: &str = "Motorista não encontrado";

pub const CIDADE_NAO_INFORMADA: &str = "Não informada";

/// Classificação resumida de um código de ocorrência.
/// Otimizado para não usar memória RAM (armazenado no binário)
pub fn get_status_ocorrencia(codigo: &str) -> &'static str {
    match codigo {
        CODIGO_ENTREGUE => "Entregue",
        CODIGO_EM_ROTA => "Em rota",
        CODIGO_EM_PISO => "Em piso",
        CODIGO_SEM_MOVIMENTACAO => "Sem movimentação",
        "" => "Sem código",
        c if CODIGOS_INSUCESSO.contains(&c) => "Insucesso",
        _ => "Outros",
    }
}

/// Verdadeiro para qualquer código preenchido que não seja entrega nem rota.
pub fn eh_falha(codigo: &str) -> bool {
    !codigo.is_empty() && codigo != CODIGO_ENTREGUE && codigo != CODIGO_EM_ROTA
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classificacao_de_codigos() {
        assert_eq!(get_status_ocorrencia("1"), "Entregue");
        assert_eq!(get_status_ocorrencia("59"), "Em rota");
        assert_eq!(get_status_ocorrencia("26"), "Insucesso");
        assert_eq!(get_status_ocorrencia("50"), "Sem movimentação");
        assert_eq!(get_status_ocorrencia("999"), "Outros");
    }

    #[test]
    fn falha_exclui_entrega_rota_e_vazio() {
        assert!(!eh_falha("1"));
        assert!(!eh_falha("59"));
        assert!(!eh_falha(""));
        assert!(eh_falha("26"));
        assert!(eh_falha("82"));
    }
}
